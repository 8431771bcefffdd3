use crate::RuntimeError;
use serde::Serialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locates an executable by name without running it.
pub trait ToolResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Resolves tools against the `PATH` entries (and `PATHEXT` on Windows).
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    search_path: Option<std::ffi::OsString>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search `path` instead of the process `PATH`.
    pub fn with_search_path(path: impl Into<std::ffi::OsString>) -> Self {
        Self {
            search_path: Some(path.into()),
        }
    }
}

impl ToolResolver for PathResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.components().count() > 1 {
            return is_executable(direct).then(|| direct.to_path_buf());
        }

        let search = self.search_path.clone().or_else(|| env::var_os("PATH"))?;
        let extensions = executable_extensions();
        env::split_paths(&search).find_map(|dir| {
            extensions.iter().find_map(|ext| {
                let candidate = dir.join(format!("{name}{ext}"));
                is_executable(&candidate).then_some(candidate)
            })
        })
    }
}

#[cfg(windows)]
fn executable_extensions() -> Vec<String> {
    let mut exts = vec![String::new()];
    let pathext = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_owned());
    exts.extend(
        pathext
            .split(';')
            .filter(|e| !e.is_empty())
            .map(str::to_owned),
    );
    exts
}

#[cfg(not(windows))]
fn executable_extensions() -> Vec<String> {
    vec![String::new()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTool {
    pub name: String,
    pub path: PathBuf,
}

/// A missing tool with actionable install instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTool {
    pub name: String,
    pub install_hint: String,
}

impl MissingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            install_hint: install_hint(name),
        }
    }
}

impl fmt::Display for MissingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  - {} (install: {})", self.name, self.install_hint)
    }
}

fn install_hint(name: &str) -> String {
    match name {
        "python3" | "python" | "py" => {
            "zypper install python3 | apt install python3 | dnf install python3 | brew install python"
                .to_owned()
        }
        "twine" => "pip install twine".to_owned(),
        "pyproject-build" => "pip install build".to_owned(),
        "git" => "zypper install git | apt install git | dnf install git | brew install git"
            .to_owned(),
        other => format!("install '{other}' and make sure it is on PATH"),
    }
}

/// Resolve every tool, collecting all missing names before failing.
pub fn check_tools(
    resolver: &dyn ToolResolver,
    tools: &[String],
) -> Result<Vec<ResolvedTool>, RuntimeError> {
    let mut resolved = Vec::with_capacity(tools.len());
    let mut missing = Vec::new();

    for name in tools {
        match resolver.resolve(name) {
            Some(path) => {
                debug!("resolved {name} -> {}", path.display());
                resolved.push(ResolvedTool {
                    name: name.clone(),
                    path,
                });
            }
            None => {
                debug!("{name} not found");
                missing.push(MissingTool::new(name));
            }
        }
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(RuntimeError::MissingDependencies { missing })
    }
}

/// Format missing tools into a user-facing message.
pub fn format_missing(missing: &[MissingTool]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing required tools:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str(
        "\nThe build also needs the Python packages 'build' and 'twine': pip install build twine",
    );
    msg
}
