use crate::RuntimeError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A distribution file produced by the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl BuildArtifact {
    pub fn size_mib(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

/// List the regular files in `dir`, sorted by file name.
pub fn inventory(dir: &Path) -> Result<Vec<BuildArtifact>, RuntimeError> {
    if !dir.is_dir() {
        return Err(RuntimeError::NoArtifactsProduced(dir.to_path_buf()));
    }

    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        artifacts.push(BuildArtifact {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            size: metadata.len(),
        });
    }

    if artifacts.is_empty() {
        return Err(RuntimeError::NoArtifactsProduced(dir.to_path_buf()));
    }
    artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(artifacts)
}
