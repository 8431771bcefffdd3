//! Release configuration (`shipyard.toml`).
//!
//! Every section is optional. A missing file yields [`ReleaseConfig::default`],
//! which describes a setuptools package built with `python3 -m build` and
//! uploaded with twine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "shipyard.toml";
pub const PRODUCTION_REGISTRY: &str = "pypi";
pub const TEST_REGISTRY: &str = "testpypi";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    #[serde(default = "default_registry")]
    pub default_registry: String,
    #[serde(default = "test_registry")]
    pub test_registry: String,
    #[serde(default)]
    pub package: PackageSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub environment: EnvironmentSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryConfig>,
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    #[serde(default = "default_package_name")]
    pub name: String,
    #[serde(default = "default_manifests")]
    pub manifests: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default = "default_build_command")]
    pub command: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_clean")]
    pub clean: Vec<String>,
    #[serde(default = "default_noise")]
    pub noise: Vec<String>,
    #[serde(default = "default_process_env")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UploadSection {
    #[serde(default = "default_upload_command")]
    pub command: Vec<String>,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    #[serde(default = "default_process_env")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    /// Extra tools required on top of the build and upload programs.
    ///
    /// Defaults to the entry points of the `build` and `twine` modules, which
    /// the default commands run through `python3 -m`. Set to `[]` when the
    /// build and upload commands need nothing beyond their own programs.
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CredentialsSection {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,
}

/// A package registry the upload stage can target.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Section name in the credential file; filled from the table key.
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub upload_args: Vec<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub install_hint: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
}

impl RegistryConfig {
    pub fn pypi() -> Self {
        Self {
            name: PRODUCTION_REGISTRY.to_owned(),
            display_name: "PyPI".to_owned(),
            token_prefix: default_token_prefix(),
            repository: None,
            upload_args: Vec::new(),
            project_url: Some("https://pypi.org/project/{package}/{version}/".to_owned()),
            install_hint: Some("pip install {package}=={version}".to_owned()),
            token_url: Some("https://pypi.org/manage/account/token/".to_owned()),
        }
    }

    pub fn testpypi() -> Self {
        Self {
            name: TEST_REGISTRY.to_owned(),
            display_name: "TestPyPI".to_owned(),
            token_prefix: default_token_prefix(),
            repository: Some("https://test.pypi.org/legacy/".to_owned()),
            upload_args: vec!["--repository".to_owned(), TEST_REGISTRY.to_owned()],
            project_url: Some("https://test.pypi.org/project/{package}/{version}/".to_owned()),
            install_hint: Some(
                "pip install -i https://test.pypi.org/simple/ {package}=={version}".to_owned(),
            ),
            token_url: Some("https://test.pypi.org/manage/account/token/".to_owned()),
        }
    }

    pub fn display(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    pub fn render_project_url(&self, package: &str, version: &str) -> Option<String> {
        self.project_url
            .as_deref()
            .map(|t| render_template(t, package, version))
    }

    pub fn render_install_hint(&self, package: &str, version: &str) -> Option<String> {
        self.install_hint
            .as_deref()
            .map(|t| render_template(t, package, version))
    }
}

fn render_template(template: &str, package: &str, version: &str) -> String {
    template
        .replace("{package}", package)
        .replace("{version}", version)
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        let mut config = Self {
            default_registry: default_registry(),
            test_registry: test_registry(),
            package: PackageSection::default(),
            build: BuildSection::default(),
            upload: UploadSection::default(),
            environment: EnvironmentSection::default(),
            credentials: CredentialsSection::default(),
            registries: BTreeMap::new(),
            libraries: BTreeMap::new(),
        };
        config.fill_registries();
        config
    }
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            name: default_package_name(),
            manifests: default_manifests(),
        }
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            output_dir: default_output_dir(),
            clean: default_clean(),
            noise: default_noise(),
            env: default_process_env(),
        }
    }
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            command: default_upload_command(),
            tail_lines: default_tail_lines(),
            env: default_process_env(),
        }
    }
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            tools: default_tools(),
        }
    }
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
            placeholders: default_placeholders(),
        }
    }
}

impl ReleaseConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("no config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(input)?;
        config.fill_registries();
        config.validate()?;
        Ok(config)
    }

    fn fill_registries(&mut self) {
        for builtin in [RegistryConfig::pypi(), RegistryConfig::testpypi()] {
            self.registries
                .entry(builtin.name.clone())
                .or_insert(builtin);
        }
        for (name, registry) in &mut self.registries {
            registry.name.clone_from(name);
            if registry.display_name.is_empty() {
                registry.display_name.clone_from(name);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.package.manifests.is_empty() {
            return Err(ConfigError::Invalid(
                "package.manifests must list at least one file".to_owned(),
            ));
        }
        if self.build.command.is_empty() {
            return Err(ConfigError::Invalid(
                "build.command must not be empty".to_owned(),
            ));
        }
        if self.upload.command.is_empty() {
            return Err(ConfigError::Invalid(
                "upload.command must not be empty".to_owned(),
            ));
        }
        if self.upload.tail_lines == 0 {
            return Err(ConfigError::Invalid(
                "upload.tail_lines must be greater than zero".to_owned(),
            ));
        }
        for name in [&self.default_registry, &self.test_registry] {
            if !self.registries.contains_key(name) {
                return Err(ConfigError::Invalid(format!(
                    "registry '{name}' is not configured"
                )));
            }
        }
        Ok(())
    }

    pub fn registry(&self, name: &str) -> Option<&RegistryConfig> {
        self.registries.get(name)
    }

    /// Production registry, or the test registry when `test` is set.
    pub fn target_registry(&self, test: bool) -> &str {
        if test {
            &self.test_registry
        } else {
            &self.default_registry
        }
    }

    /// Build and upload programs plus any extra configured tools, deduplicated in order.
    pub fn required_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        let candidates = self
            .build
            .command
            .first()
            .into_iter()
            .chain(self.upload.command.first())
            .chain(self.environment.tools.iter());
        for tool in candidates {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }
        tools
    }

    pub fn credentials_path(&self) -> PathBuf {
        expand_home(&self.credentials.path)
    }
}

/// Expand a leading `~/` using `HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

fn default_registry() -> String {
    PRODUCTION_REGISTRY.to_owned()
}

fn test_registry() -> String {
    TEST_REGISTRY.to_owned()
}

fn default_package_name() -> String {
    "SunnyNet".to_owned()
}

fn default_manifests() -> Vec<PathBuf> {
    vec![PathBuf::from("setup.py"), PathBuf::from("pyproject.toml")]
}

fn default_build_command() -> Vec<String> {
    ["python3", "-m", "build"].map(str::to_owned).to_vec()
}

fn default_upload_command() -> Vec<String> {
    ["python3", "-m", "twine", "upload"]
        .map(str::to_owned)
        .to_vec()
}

fn default_tools() -> Vec<String> {
    ["pyproject-build", "twine"].map(str::to_owned).to_vec()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_clean() -> Vec<String> {
    ["build", "dist", "*.egg-info"].map(str::to_owned).to_vec()
}

fn default_noise() -> Vec<String> {
    [
        "SetuptoolsDeprecationWarning",
        "!!",
        "****",
        "Please use",
        "See https://",
    ]
    .map(str::to_owned)
    .to_vec()
}

fn default_process_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("PYTHONIOENCODING".to_owned(), "utf-8".to_owned()),
        ("PYTHONUTF8".to_owned(), "1".to_owned()),
    ])
}

fn default_tail_lines() -> usize {
    20
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("~/.pypirc")
}

fn default_placeholders() -> Vec<String> {
    ["Token", "你的", "..."].map(str::to_owned).to_vec()
}

fn default_token_prefix() -> String {
    "pypi-".to_owned()
}
