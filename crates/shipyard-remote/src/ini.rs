//! Minimal INI reader for `.pypirc`-style credential files.
//!
//! Supports `[section]` headers, `key = value` and `key: value` pairs, full-line
//! `#`/`;` comments, and indented continuation lines. Keys are lowercased;
//! section names keep their case.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct IniError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniDocument {
    pub fn parse(input: &str) -> Result<Self, IniError> {
        let mut doc = Self::default();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in input.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(' ') || raw.starts_with('\t');
            if indented {
                if let (Some(section), Some(key)) = (&current, &last_key) {
                    if let Some(value) = doc
                        .sections
                        .get_mut(section)
                        .and_then(|entries| entries.get_mut(key))
                    {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| IniError {
                    line: line_no,
                    message: format!("unterminated section header '{trimmed}'"),
                })?;
                let name = name.trim().to_owned();
                doc.sections.entry(name.clone()).or_default();
                current = Some(name);
                last_key = None;
                continue;
            }

            let Some(split) = trimmed.find(['=', ':']) else {
                return Err(IniError {
                    line: line_no,
                    message: "expected 'key = value'".to_owned(),
                });
            };
            let Some(section) = &current else {
                return Err(IniError {
                    line: line_no,
                    message: "key outside of any section".to_owned(),
                });
            };

            let key = trimmed[..split].trim().to_lowercase();
            let value = trimmed[split + 1..].trim().to_owned();
            if key.is_empty() {
                return Err(IniError {
                    line: line_no,
                    message: "empty key".to_owned(),
                });
            }
            doc.sections
                .entry(section.clone())
                .or_default()
                .insert(key.clone(), value);
            last_key = Some(key);
        }

        Ok(doc)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}
