//! Version model, manifest version store, release configuration, and library table for Shipyard.
//!
//! This crate defines the data layer: strict `X.Y.Z` versions and bump rules
//! (`Version`, `BumpKind`), in-place version rewriting across manifest files
//! (`VersionStore`), the `shipyard.toml` configuration (`ReleaseConfig`), and
//! the platform library URL table (`LibraryTable`).

pub mod config;
pub mod library;
pub mod manifest;
pub mod version;

pub use config::{
    expand_home, BuildSection, ConfigError, CredentialsSection, EnvironmentSection,
    PackageSection, RegistryConfig, ReleaseConfig, UploadSection, DEFAULT_CONFIG_FILE,
    PRODUCTION_REGISTRY, TEST_REGISTRY,
};
pub use library::LibraryTable;
pub use manifest::{ManifestError, ManifestRef, VersionStore};
pub use version::{BumpKind, Version, VersionError};
