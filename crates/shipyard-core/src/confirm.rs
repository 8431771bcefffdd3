use crate::CoreError;
use shipyard_schema::Version;
use std::path::PathBuf;

/// A yes/no decision the release needs from its operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmRequest {
    /// Proceed with rewriting manifests and publishing.
    Publish {
        package: String,
        current: Version,
        target: Version,
        registries: Vec<String>,
    },
    /// The credential file is absent; continue on the assumption the upload
    /// tool finds credentials elsewhere (environment, keyring).
    CredentialsElsewhere { path: PathBuf },
}

impl ConfirmRequest {
    pub fn prompt(&self) -> String {
        match self {
            Self::Publish {
                package,
                current,
                target,
                registries,
            } => format!(
                "Publish {package} {current} -> {target} to {}?",
                registries.join(", ")
            ),
            Self::CredentialsElsewhere { path } => format!(
                "No credential file at {}. Are credentials configured elsewhere?",
                path.display()
            ),
        }
    }
}

pub trait ConfirmationSource {
    fn confirm(&mut self, request: &ConfirmRequest) -> Result<bool, CoreError>;
}

/// Accepts every request. Used for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmationSource for AutoConfirm {
    fn confirm(&mut self, _request: &ConfirmRequest) -> Result<bool, CoreError> {
        Ok(true)
    }
}
