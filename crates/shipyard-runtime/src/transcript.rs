use std::collections::VecDeque;

/// Captured subprocess output, optionally keeping only the last `limit` lines.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: VecDeque<String>,
    limit: Option<usize>,
    total: usize,
}

impl Transcript {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit),
            limit: Some(limit),
            total: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.total += 1;
        if let Some(limit) = self.limit {
            if limit == 0 {
                return;
            }
            if self.lines.len() == limit {
                self.lines.pop_front();
            }
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines seen in total, including any evicted from a bounded transcript.
    pub fn total_lines(&self) -> usize {
        self.total
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}
