use crate::RuntimeError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Remove build leftovers matching `patterns` (relative to `root`).
///
/// Directories are removed recursively. Paths that vanish between matching and
/// removal are skipped. Returns the removed paths in removal order.
pub fn clean_workspace(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, RuntimeError> {
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let mut removed = Vec::new();

    for pattern in patterns {
        check_relative(pattern)?;
        let full = format!("{escaped_root}/{pattern}");
        let matches = glob::glob(&full).map_err(|e| RuntimeError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        for entry in matches {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    debug!("skipping unreadable match: {e}");
                    continue;
                }
            };
            let result = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    debug!("removed {}", path.display());
                    removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(removed)
}

fn check_relative(pattern: &str) -> Result<(), RuntimeError> {
    let path = Path::new(pattern);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if pattern.is_empty() || escapes {
        return Err(RuntimeError::InvalidPattern {
            pattern: pattern.to_owned(),
            message: "clean patterns must be relative paths inside the package root".to_owned(),
        });
    }
    Ok(())
}
