use crate::ini::{IniDocument, IniError};
use serde::Serialize;
use shipyard_schema::RegistryConfig;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_USERNAME: &str = "__token__";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file not found: {0}")]
    FileMissing(PathBuf),
    #[error("no credentials for '{registry}' in {path}: {detail}")]
    CredentialMissing {
        registry: String,
        path: PathBuf,
        detail: String,
    },
    #[error("credentials for '{registry}' are malformed: {reason}")]
    CredentialMalformed { registry: String, reason: String },
    #[error("credential file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse credential file {path}: {source}")]
    Parse { path: PathBuf, source: IniError },
}

/// A validated registry credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub registry: String,
    pub username: String,
    pub repository: Option<String>,
    secret: String,
}

impl CredentialRecord {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("repository", &self.repository)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-registry view of the credential file, safe to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub registry: String,
    pub display_name: String,
    pub configured: bool,
    pub username: Option<String>,
    pub repository: Option<String>,
    pub masked_secret: Option<String>,
    pub valid: bool,
    pub problem: Option<String>,
}

/// One registry section to write during setup.
#[derive(Clone)]
pub struct SetupEntry {
    pub registry: String,
    pub repository: Option<String>,
    pub secret: String,
}

impl SetupEntry {
    pub fn for_registry(registry: &RegistryConfig, secret: impl Into<String>) -> Self {
        Self {
            registry: registry.name.clone(),
            repository: registry.repository.clone(),
            secret: secret.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub registries: Vec<String>,
}

/// Reads, validates, and writes the registry credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    placeholders: Vec<String>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, placeholders: Vec<String>) -> Self {
        Self {
            path: path.into(),
            placeholders,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    fn load(&self) -> Result<IniDocument, CredentialError> {
        if !self.exists() {
            return Err(CredentialError::FileMissing(self.path.clone()));
        }
        let content = fs::read_to_string(&self.path).map_err(|source| CredentialError::Io {
            path: self.path.clone(),
            source,
        })?;
        IniDocument::parse(&content).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Check that `registry` has a usable secret.
    pub fn validate(&self, registry: &RegistryConfig) -> Result<CredentialRecord, CredentialError> {
        let doc = self.load()?;
        let record = self.record_from(&doc, registry)?;
        debug!(
            "credentials for {} ok (secret {})",
            record.registry,
            record.masked()
        );
        Ok(record)
    }

    fn record_from(
        &self,
        doc: &IniDocument,
        registry: &RegistryConfig,
    ) -> Result<CredentialRecord, CredentialError> {
        let missing = |detail: &str| CredentialError::CredentialMissing {
            registry: registry.name.clone(),
            path: self.path.clone(),
            detail: detail.to_owned(),
        };

        if !doc.has_section(&registry.name) {
            return Err(missing(&format!("no [{}] section", registry.name)));
        }
        let secret = doc
            .get(&registry.name, "password")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("password is missing or empty"))?;

        if let Some(marker) = self
            .placeholders
            .iter()
            .find(|m| !m.is_empty() && secret.contains(m.as_str()))
        {
            return Err(CredentialError::CredentialMalformed {
                registry: registry.name.clone(),
                reason: format!("password still contains the placeholder marker '{marker}'"),
            });
        }
        if !secret.starts_with(&registry.token_prefix) {
            return Err(CredentialError::CredentialMalformed {
                registry: registry.name.clone(),
                reason: format!("password should start with '{}'", registry.token_prefix),
            });
        }

        Ok(CredentialRecord {
            registry: registry.name.clone(),
            username: doc
                .get(&registry.name, "username")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_USERNAME)
                .to_owned(),
            repository: doc
                .get(&registry.name, "repository")
                .map(|s| s.trim().to_owned()),
            secret: secret.to_owned(),
        })
    }

    /// Report each registry's section with a masked secret.
    pub fn inspect(
        &self,
        registries: &[&RegistryConfig],
    ) -> Result<Vec<RegistryStatus>, CredentialError> {
        let doc = self.load()?;
        Ok(registries
            .iter()
            .map(|registry| {
                let configured = doc.has_section(&registry.name);
                let password = doc
                    .get(&registry.name, "password")
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                let verdict = self.record_from(&doc, registry);
                RegistryStatus {
                    registry: registry.name.clone(),
                    display_name: registry.display().to_owned(),
                    configured,
                    username: doc.get(&registry.name, "username").map(str::to_owned),
                    repository: doc.get(&registry.name, "repository").map(str::to_owned),
                    masked_secret: password.map(mask_secret),
                    valid: verdict.is_ok(),
                    problem: verdict.err().map(|e| e.to_string()),
                }
            })
            .collect())
    }

    /// Render and atomically write a fresh credential file.
    ///
    /// An existing file is copied to `<path>.backup` first. On Unix the new file
    /// is created `0600` before any secret is written into it.
    pub fn write_config(&self, entries: &[SetupEntry]) -> Result<WriteSummary, CredentialError> {
        let io_err = |source| CredentialError::Io {
            path: self.path.clone(),
            source,
        };

        let backup = if self.exists() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(io_err)?;
            info!("backed up {} to {}", self.path.display(), backup.display());
            Some(backup)
        } else {
            None
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        tmp.write_all(render_config(entries).as_bytes())
            .map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        Ok(WriteSummary {
            path: self.path.clone(),
            backup,
            registries: entries.iter().map(|e| e.registry.clone()).collect(),
        })
    }

    /// Whether the file is owner-only (`0600`). Missing files and non-Unix
    /// platforms report `true`.
    #[cfg(unix)]
    pub fn permissions_ok(&self) -> Result<bool, CredentialError> {
        use std::os::unix::fs::PermissionsExt;
        if !self.exists() {
            return Ok(true);
        }
        let metadata = fs::metadata(&self.path).map_err(|source| CredentialError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(metadata.permissions().mode() & 0o777 == 0o600)
    }

    #[cfg(not(unix))]
    pub fn permissions_ok(&self) -> Result<bool, CredentialError> {
        Ok(true)
    }
}

fn render_config(entries: &[SetupEntry]) -> String {
    let mut out = String::from("[distutils]\nindex-servers =\n");
    for entry in entries {
        out.push_str("    ");
        out.push_str(&entry.registry);
        out.push('\n');
    }
    for entry in entries {
        out.push('\n');
        out.push_str(&format!("[{}]\n", entry.registry));
        if let Some(repository) = &entry.repository {
            out.push_str(&format!("repository = {repository}\n"));
        }
        out.push_str(&format!("username = {DEFAULT_USERNAME}\n"));
        out.push_str(&format!("password = {}\n", entry.secret));
    }
    out
}

/// Mask a secret for display: first and last 10 characters when longer than
/// 20, otherwise the first 5 followed by `...`.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        format!("{head}...{tail}")
    } else {
        let head: String = chars.iter().take(5).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "pypi-AgEIcHlwaS5vcmcCJGFiY2RlZmdoLTEyMzQ";

    fn placeholders() -> Vec<String> {
        ["Token", "你的", "..."].map(str::to_owned).to_vec()
    }

    fn store_with(content: &str) -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pypirc");
        fs::write(&path, content).unwrap();
        (dir, CredentialStore::new(path, placeholders()))
    }

    #[test]
    fn valid_token_accepted() {
        let (_dir, store) = store_with(&format!(
            "[pypi]\nusername = __token__\npassword = {TOKEN}\n"
        ));
        let record = store.validate(&RegistryConfig::pypi()).unwrap();
        assert_eq!(record.registry, "pypi");
        assert_eq!(record.username, "__token__");
        assert_eq!(record.secret(), TOKEN);
    }

    #[test]
    fn username_defaults_when_absent() {
        let (_dir, store) = store_with(&format!("[pypi]\npassword = {TOKEN}\n"));
        let record = store.validate(&RegistryConfig::pypi()).unwrap();
        assert_eq!(record.username, DEFAULT_USERNAME);
    }

    #[test]
    fn missing_file_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("absent"), placeholders());
        assert!(matches!(
            store.validate(&RegistryConfig::pypi()),
            Err(CredentialError::FileMissing(_))
        ));
    }

    #[test]
    fn missing_section_or_password() {
        let (_dir, store) = store_with(&format!("[testpypi]\npassword = {TOKEN}\n"));
        assert!(matches!(
            store.validate(&RegistryConfig::pypi()),
            Err(CredentialError::CredentialMissing { .. })
        ));

        let (_dir, store) = store_with("[pypi]\nusername = __token__\npassword =\n");
        assert!(matches!(
            store.validate(&RegistryConfig::pypi()),
            Err(CredentialError::CredentialMissing { .. })
        ));
    }

    #[test]
    fn placeholder_rejected() {
        for secret in ["pypi-你的Token", "pypi-AgE...", "YourToken"] {
            let (_dir, store) = store_with(&format!("[pypi]\npassword = {secret}\n"));
            let err = store.validate(&RegistryConfig::pypi()).unwrap_err();
            assert!(
                matches!(err, CredentialError::CredentialMalformed { .. }),
                "{secret}: {err:?}"
            );
            assert!(!err.to_string().contains(secret));
        }
    }

    #[test]
    fn wrong_prefix_rejected() {
        let (_dir, store) = store_with("[pypi]\npassword = abcdefghijklmnop\n");
        let err = store.validate(&RegistryConfig::pypi()).unwrap_err();
        assert!(matches!(err, CredentialError::CredentialMalformed { .. }));
        assert!(!err.to_string().contains("abcdefghijklmnop"));
    }

    #[test]
    fn debug_redacts_secret() {
        let (_dir, store) = store_with(&format!("[pypi]\npassword = {TOKEN}\n"));
        let record = store.validate(&RegistryConfig::pypi()).unwrap();
        let debug = format!("{record:?}");
        assert!(!debug.contains(TOKEN));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn mask_rules() {
        assert_eq!(mask_secret(TOKEN), "pypi-AgEIc...mdoLTEyMzQ");
        let long = "abcdefghij0123456789XYZ";
        assert_eq!(mask_secret(long), "abcdefghij...3456789XYZ");
        assert_eq!(mask_secret("pypi-short"), "pypi-...");
        assert_eq!(mask_secret("abc"), "abc...");
    }

    #[test]
    fn inspect_reports_each_registry() {
        let (_dir, store) = store_with(&format!(
            "[pypi]\npassword = {TOKEN}\n\n[testpypi]\nrepository = https://test.pypi.org/legacy/\npassword = bad\n"
        ));
        let pypi = RegistryConfig::pypi();
        let test = RegistryConfig::testpypi();
        let statuses = store.inspect(&[&pypi, &test]).unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].valid);
        assert_eq!(
            statuses[0].masked_secret.as_deref(),
            Some("pypi-AgEIc...mdoLTEyMzQ")
        );
        assert!(!statuses[1].valid);
        assert_eq!(statuses[1].masked_secret.as_deref(), Some("bad..."));
        assert!(statuses[1].problem.is_some());

        let json = serde_json::to_string(&statuses).unwrap();
        assert!(!json.contains(TOKEN));
    }

    #[test]
    fn write_config_round_trips_through_validate() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".pypirc"), placeholders());
        let summary = store
            .write_config(&[
                SetupEntry::for_registry(&RegistryConfig::pypi(), TOKEN),
                SetupEntry::for_registry(&RegistryConfig::testpypi(), TOKEN),
            ])
            .unwrap();
        assert!(summary.backup.is_none());

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.starts_with("[distutils]\nindex-servers =\n    pypi\n    testpypi\n"));
        assert!(content.contains("[testpypi]\nrepository = https://test.pypi.org/legacy/\n"));

        let test = store.validate(&RegistryConfig::testpypi()).unwrap();
        assert_eq!(test.repository.as_deref(), Some("https://test.pypi.org/legacy/"));
        assert!(store.validate(&RegistryConfig::pypi()).is_ok());
    }

    #[test]
    fn write_config_backs_up_existing() {
        let (_dir, store) = store_with("[pypi]\npassword = old\n");
        let summary = store
            .write_config(&[SetupEntry::for_registry(&RegistryConfig::pypi(), TOKEN)])
            .unwrap();
        let backup = summary.backup.unwrap();
        assert_eq!(backup, store.backup_path());
        assert_eq!(fs::read_to_string(backup).unwrap(), "[pypi]\npassword = old\n");
        assert!(store.validate(&RegistryConfig::pypi()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store_with("[pypi]\npassword = old\n");
        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!store.permissions_ok().unwrap());

        store
            .write_config(&[SetupEntry::for_registry(&RegistryConfig::pypi(), TOKEN)])
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert!(store.permissions_ok().unwrap());
    }
}
