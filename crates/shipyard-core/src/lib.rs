//! Release orchestration for Shipyard.
//!
//! This crate ties the schema, credential, and runtime layers together into the
//! `ReleaseController`: a forward-only state machine that checks tools, bumps
//! the version, builds, validates credentials, and uploads. It also provides
//! lifecycle validation, the confirmation gate, the per-root release lock, and
//! the Ctrl-C handler.

pub mod concurrency;
pub mod confirm;
pub mod controller;
pub mod lifecycle;
pub mod session;

pub use concurrency::{install_signal_handler, ReleaseLock, EXIT_INTERRUPTED, LOCK_FILE_NAME};
pub use confirm::{AutoConfirm, ConfirmRequest, ConfirmationSource};
pub use controller::{
    NullObserver, ReleaseController, ReleaseFailure, ReleaseObserver, ReleaseOptions,
};
pub use lifecycle::{validate_transition, ReleaseStage};
pub use session::{ReleaseReport, ReleaseSession, UploadRecord};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] shipyard_schema::ConfigError),
    #[error("version error: {0}")]
    Version(#[from] shipyard_schema::VersionError),
    #[error("manifest error: {0}")]
    Manifest(#[from] shipyard_schema::ManifestError),
    #[error("credential error: {0}")]
    Credential(#[from] shipyard_remote::CredentialError),
    #[error("runtime error: {0}")]
    Runtime(#[from] shipyard_runtime::RuntimeError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("release declined")]
    Declined,
    #[error("interrupted")]
    Interrupted,
    #[error("unknown registry: {0}")]
    UnknownRegistry(String),
    #[error("prompt failed: {0}")]
    Prompt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
