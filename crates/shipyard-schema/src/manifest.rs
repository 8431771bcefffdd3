//! Version store over one or more text manifests (e.g. `setup.py`, `pyproject.toml`).
//!
//! Each manifest carries a single `version = "X.Y.Z"` assignment. Reads use the
//! primary manifest; writes splice the new token into every manifest in place,
//! leaving every other byte untouched.

use crate::version::{Version, VersionError};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

static VERSION_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"version\s*=\s*["']([^"']*)["']"#).expect("valid assignment regex")
});

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no version assignment found in {0}")]
    NoAssignment(PathBuf),
    #[error("no manifests configured")]
    NoManifests,
    #[error(
        "partial manifest write: updated {} of {} manifest(s), failed at {failed}: {cause}",
        .updated.len(),
        .updated.len() + 1 + .remaining.len()
    )]
    PartialWrite {
        updated: Vec<PathBuf>,
        failed: PathBuf,
        remaining: Vec<PathBuf>,
        cause: String,
    },
}

/// A file that must carry the package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestRef {
    path: PathBuf,
}

impl ManifestRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

/// Reads and rewrites the version token across the configured manifests.
#[derive(Debug, Clone)]
pub struct VersionStore {
    manifests: Vec<ManifestRef>,
}

impl VersionStore {
    /// The first manifest is the primary one used by [`read`](Self::read).
    pub fn new(manifests: Vec<ManifestRef>) -> Result<Self, ManifestError> {
        if manifests.is_empty() {
            return Err(ManifestError::NoManifests);
        }
        Ok(Self { manifests })
    }

    pub fn from_paths<P: AsRef<Path>>(root: &Path, paths: &[P]) -> Result<Self, ManifestError> {
        Self::new(
            paths
                .iter()
                .map(|p| ManifestRef::new(root.join(p)))
                .collect(),
        )
    }

    pub fn primary(&self) -> &ManifestRef {
        &self.manifests[0]
    }

    pub fn manifests(&self) -> &[ManifestRef] {
        &self.manifests
    }

    /// Read the version from the primary manifest.
    pub fn read(&self) -> Result<Version, VersionError> {
        read_manifest(self.primary())
    }

    /// Read every manifest's version, in configuration order.
    pub fn read_all(&self) -> Vec<(ManifestRef, Result<Version, VersionError>)> {
        self.manifests
            .iter()
            .map(|m| (m.clone(), read_manifest(m)))
            .collect()
    }

    /// Rewrite the version in each listed manifest.
    ///
    /// All manifests are loaded and checked for an assignment before the first
    /// write, so a missing assignment fails with nothing written. A write error
    /// after at least one manifest was updated is reported as
    /// [`ManifestError::PartialWrite`].
    pub fn write(
        &self,
        new_version: Version,
        manifests: &[ManifestRef],
    ) -> Result<Vec<PathBuf>, ManifestError> {
        if manifests.is_empty() {
            return Err(ManifestError::NoManifests);
        }

        let mut staged = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let content =
                fs::read_to_string(manifest.path()).map_err(|source| ManifestError::Read {
                    path: manifest.path.clone(),
                    source,
                })?;
            let span = assignment_span(&content)
                .ok_or_else(|| ManifestError::NoAssignment(manifest.path.clone()))?;
            staged.push((manifest, content, span));
        }

        let token = new_version.to_string();
        let mut updated: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (idx, (manifest, content, span)) in staged.iter().enumerate() {
            let mut rewritten = String::with_capacity(content.len() + token.len());
            rewritten.push_str(&content[..span.start]);
            rewritten.push_str(&token);
            rewritten.push_str(&content[span.end..]);

            if let Err(source) = write_in_place(manifest.path(), &rewritten) {
                if updated.is_empty() {
                    return Err(ManifestError::Write {
                        path: manifest.path.clone(),
                        source,
                    });
                }
                return Err(ManifestError::PartialWrite {
                    updated,
                    failed: manifest.path.clone(),
                    remaining: staged[idx + 1..]
                        .iter()
                        .map(|(m, _, _)| m.path.clone())
                        .collect(),
                    cause: source.to_string(),
                });
            }
            debug!("wrote version {token} to {}", manifest.display());
            updated.push(manifest.path.clone());
        }

        Ok(updated)
    }

    /// Rewrite every configured manifest.
    pub fn write_all(&self, new_version: Version) -> Result<Vec<PathBuf>, ManifestError> {
        self.write(new_version, &self.manifests)
    }
}

fn read_manifest(manifest: &ManifestRef) -> Result<Version, VersionError> {
    let content = fs::read_to_string(manifest.path()).map_err(|e| VersionError::Read {
        path: manifest.display(),
        message: e.to_string(),
    })?;
    let span =
        assignment_span(&content).ok_or_else(|| VersionError::NoAssignment(manifest.display()))?;
    Version::parse_from(&content[span], &manifest.display())
}

/// Byte range of the version token inside the first assignment.
fn assignment_span(content: &str) -> Option<Range<usize>> {
    VERSION_ASSIGNMENT
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
}

/// Replace `path` atomically, keeping its permissions.
fn write_in_place(path: &Path, content: &str) -> std::io::Result<()> {
    let permissions = fs::metadata(path)?.permissions();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP_PY: &str = r#"from setuptools import setup

setup(
    name="SunnyNet",
    version="1.3.3",
    packages=["SunnyNet"],
    python_requires=">=3.7",
)
"#;

    const PYPROJECT: &str = r#"[build-system]
requires = ["setuptools>=61"]

[project]
name = "SunnyNet"
version = '1.3.3'
description = "proxy"
"#;

    fn fixture() -> (tempfile::TempDir, VersionStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("setup.py"), SETUP_PY).unwrap();
        fs::write(dir.path().join("pyproject.toml"), PYPROJECT).unwrap();
        let store = VersionStore::from_paths(dir.path(), &["setup.py", "pyproject.toml"]).unwrap();
        (dir, store)
    }

    #[test]
    fn read_primary_version() {
        let (_dir, store) = fixture();
        assert_eq!(store.read().unwrap(), Version::new(1, 3, 3));
    }

    #[test]
    fn write_then_reread_preserves_other_bytes() {
        let (dir, store) = fixture();
        store.write_all(Version::new(1, 3, 4)).unwrap();

        assert_eq!(store.read().unwrap().to_string(), "1.3.4");
        let setup = fs::read_to_string(dir.path().join("setup.py")).unwrap();
        assert_eq!(setup, SETUP_PY.replace("1.3.3", "1.3.4"));
        let pyproject = fs::read_to_string(dir.path().join("pyproject.toml")).unwrap();
        assert_eq!(pyproject, PYPROJECT.replace("1.3.3", "1.3.4"));
    }

    #[test]
    fn write_replaces_first_match_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.py");
        fs::write(&path, "version = \"1.0.0\"\nother_version = \"9.9.9\"\n").unwrap();
        let store = VersionStore::from_paths(dir.path(), &["setup.py"]).unwrap();

        store.write_all(Version::new(1, 0, 1)).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "version = \"1.0.1\"\nother_version = \"9.9.9\"\n"
        );
    }

    #[test]
    fn malformed_version_fails_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.py");
        let content = "setup(version = \"abc\")\n";
        fs::write(&path, content).unwrap();
        let store = VersionStore::from_paths(dir.path(), &["setup.py"]).unwrap();

        let err = store.read().unwrap_err();
        assert!(matches!(err, VersionError::Format { ref found, .. } if found == "abc"));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn missing_assignment_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("setup.py"), "name = 'x'\n").unwrap();
        let store = VersionStore::from_paths(dir.path(), &["setup.py"]).unwrap();
        assert!(matches!(store.read(), Err(VersionError::NoAssignment(_))));
    }

    #[test]
    fn write_checks_every_manifest_before_writing() {
        let (dir, _) = fixture();
        fs::write(dir.path().join("broken.cfg"), "no assignment here\n").unwrap();
        let store =
            VersionStore::from_paths(dir.path(), &["setup.py", "broken.cfg", "pyproject.toml"])
                .unwrap();

        let err = store.write_all(Version::new(2, 0, 0)).unwrap_err();
        assert!(matches!(err, ManifestError::NoAssignment(_)));
        let setup = fs::read_to_string(dir.path().join("setup.py")).unwrap();
        assert_eq!(setup, SETUP_PY, "nothing is written when staging fails");
    }

    #[cfg(unix)]
    #[test]
    fn write_failure_after_first_update_is_partial() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, _) = fixture();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("version.py"), "version = '1.3.3'\n").unwrap();
        let store =
            VersionStore::from_paths(dir.path(), &["setup.py", "locked/version.py"]).unwrap();

        // read-only parent directory: the temp file cannot be created
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        let result = store.write_all(Version::new(1, 3, 4));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // root ignores directory permissions; nothing to assert in that case
        let Err(err) = result else { return };
        match err {
            ManifestError::PartialWrite {
                updated, failed, ..
            } => {
                assert_eq!(updated, vec![dir.path().join("setup.py")]);
                assert_eq!(failed, locked.join("version.py"));
            }
            other => panic!("expected PartialWrite, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, store) = fixture();
        let path = dir.path().join("setup.py");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        store.write_all(Version::new(1, 3, 4)).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn read_all_reports_each_manifest() {
        let (dir, store) = fixture();
        fs::write(dir.path().join("pyproject.toml"), "version = \"1.2.0\"\n").unwrap();
        let versions: Vec<_> = store
            .read_all()
            .into_iter()
            .map(|(_, v)| v.unwrap())
            .collect();
        assert_eq!(versions, vec![Version::new(1, 3, 3), Version::new(1, 2, 0)]);
    }

    #[test]
    fn empty_manifest_list_rejected() {
        assert!(matches!(
            VersionStore::new(Vec::new()),
            Err(ManifestError::NoManifests)
        ));
    }
}
