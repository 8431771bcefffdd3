//! Registry credential handling for Shipyard.
//!
//! The credential file is the INI-style `.pypirc` read by the upload tool.
//! This crate validates the per-registry secret before an upload starts,
//! reports masked status for diagnostics, and writes a fresh owner-only file
//! during setup.

pub mod credentials;
pub mod ini;

pub use credentials::{
    mask_secret, CredentialError, CredentialRecord, CredentialStore, RegistryStatus, SetupEntry,
    WriteSummary, DEFAULT_USERNAME,
};
pub use ini::{IniDocument, IniError};
