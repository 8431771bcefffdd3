use crate::artifacts::BuildArtifact;
use crate::events::{ProgressEvent, ProgressSink};
use crate::interrupt::Interrupt;
use crate::process::{describe_status, run_streaming, CommandSpec};
use crate::transcript::Transcript;
use crate::RuntimeError;
use serde::Serialize;
use shipyard_schema::{RegistryConfig, UploadSection};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadLineKind {
    Progress,
    CompletionLink,
    Error,
    Warning,
    Other,
}

/// Classify one line of upload tool output. Rules apply in order; the first
/// match wins.
pub fn classify_upload_line(line: &str) -> UploadLineKind {
    if line.contains("Uploading") {
        if line.contains(".tar.gz") || line.contains(".whl") {
            UploadLineKind::Progress
        } else {
            UploadLineKind::Other
        }
    } else if line.contains("100%") {
        UploadLineKind::Progress
    } else if line.contains("View at:") {
        UploadLineKind::CompletionLink
    } else if line.to_lowercase().contains("error") {
        UploadLineKind::Error
    } else if line.contains("WARNING") {
        UploadLineKind::Warning
    } else {
        UploadLineKind::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub registry: String,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub links: Vec<String>,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Runs the upload tool for one registry at a time.
#[derive(Debug, Clone)]
pub struct UploadOrchestrator {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    tail_lines: usize,
}

impl UploadOrchestrator {
    pub fn new(command: Vec<String>, tail_lines: usize) -> Self {
        Self {
            command,
            env: BTreeMap::new(),
            tail_lines,
        }
    }

    pub fn from_config(upload: &UploadSection) -> Self {
        Self {
            command: upload.command.clone(),
            env: upload.env.clone(),
            tail_lines: upload.tail_lines,
        }
    }

    /// Upload `artifacts` to `registry`. Nothing is spawned for an empty list.
    pub fn upload(
        &self,
        artifacts: &[BuildArtifact],
        registry: &RegistryConfig,
        working_dir: &Path,
        interrupt: &Interrupt,
        sink: &mut dyn ProgressSink,
    ) -> Result<UploadOutcome, RuntimeError> {
        if artifacts.is_empty() {
            return Err(RuntimeError::NothingToUpload);
        }

        let spec = CommandSpec::from_argv(&self.command, working_dir)?
            .with_env(&self.env)
            .with_args(registry.upload_args.iter().cloned())
            .with_args(artifacts.iter().map(|a| a.path.to_string_lossy().into_owned()));
        info!(
            "uploading {} file(s) to {}",
            artifacts.len(),
            registry.display()
        );

        let started = Instant::now();
        let mut tail = Transcript::bounded(self.tail_lines);
        let mut links = Vec::new();
        let mut link_follows = false;
        let status = run_streaming(&spec, interrupt, |_, raw| {
            let line = raw.trim_end();
            if line.is_empty() {
                return;
            }
            tail.push(line);
            let mut kind = classify_upload_line(line);
            if link_follows {
                // twine prints the URL on the line after "View at:"
                link_follows = false;
                links.push(line.trim().to_owned());
                kind = UploadLineKind::CompletionLink;
            } else if kind == UploadLineKind::CompletionLink {
                match line.split_once("View at:").map(|(_, url)| url.trim()) {
                    Some(url) if !url.is_empty() => links.push(url.to_owned()),
                    _ => link_follows = true,
                }
            }
            if kind != UploadLineKind::Other {
                sink.event(ProgressEvent::UploadOutput { kind, line });
            }
        })?;

        if !status.success() {
            return Err(RuntimeError::UploadFailed {
                registry: registry.name.clone(),
                status: describe_status(status),
                total_lines: tail.total_lines(),
                tail: tail.into_lines(),
            });
        }

        let elapsed = started.elapsed();
        info!(
            "upload to {} finished in {:.2}s",
            registry.display(),
            elapsed.as_secs_f64()
        );
        Ok(UploadOutcome {
            registry: registry.name.clone(),
            elapsed,
            links,
        })
    }
}
