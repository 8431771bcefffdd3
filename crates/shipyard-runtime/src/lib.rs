//! External tool execution for Shipyard releases.
//!
//! This crate implements the stages that touch the outside world: resolving
//! required tools on `PATH`, cleaning build leftovers, running the build and
//! upload commands with live line-by-line output, and listing the produced
//! distribution files. Every subprocess is cancellable through a shared
//! [`Interrupt`].

pub mod artifacts;
pub mod build;
pub mod clean;
pub mod events;
pub mod interrupt;
pub mod prereq;
pub mod process;
pub mod transcript;
pub mod upload;

pub use artifacts::{inventory, BuildArtifact};
pub use build::{classify_build_line, BuildLine, BuildOrchestrator, BuildOutcome, BuildPhase};
pub use clean::clean_workspace;
pub use events::{NullSink, ProgressEvent, ProgressSink};
pub use interrupt::Interrupt;
pub use prereq::{check_tools, format_missing, MissingTool, PathResolver, ResolvedTool, ToolResolver};
pub use process::{run_streaming, CommandSpec, Stream};
pub use transcript::Transcript;
pub use upload::{classify_upload_line, UploadLineKind, UploadOrchestrator, UploadOutcome};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required tools: {}", .missing.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", "))]
    MissingDependencies { missing: Vec<MissingTool> },
    #[error("command is empty")]
    EmptyCommand,
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("build failed ({status})")]
    BuildFailed {
        status: String,
        transcript: Vec<String>,
    },
    #[error("no artifacts produced in {0}")]
    NoArtifactsProduced(PathBuf),
    #[error("nothing to upload")]
    NothingToUpload,
    #[error("upload to '{registry}' failed ({status})")]
    UploadFailed {
        registry: String,
        status: String,
        tail: Vec<String>,
        /// Non-blank lines the uploader printed; `tail` keeps the last few.
        total_lines: usize,
    },
    #[error("interrupted")]
    Interrupted,
    #[error("invalid clean pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
