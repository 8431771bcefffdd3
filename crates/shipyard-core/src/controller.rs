use crate::confirm::{ConfirmRequest, ConfirmationSource};
use crate::lifecycle::{validate_transition, ReleaseStage};
use crate::session::{ReleaseReport, ReleaseSession, UploadRecord};
use crate::CoreError;
use chrono::Utc;
use shipyard_remote::{CredentialError, CredentialStore};
use shipyard_runtime::{
    check_tools, clean_workspace, BuildArtifact, BuildOrchestrator, Interrupt, PathResolver,
    ProgressEvent, ProgressSink, ResolvedTool, RuntimeError, ToolResolver, UploadOrchestrator,
    UploadOutcome,
};
use shipyard_schema::{BumpKind, RegistryConfig, ReleaseConfig, Version, VersionStore};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// What to release and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOptions {
    pub bump: BumpKind,
    /// Registry names, uploaded to in order.
    pub registries: Vec<String>,
    pub skip_confirmation: bool,
}

impl ReleaseOptions {
    /// Target the configured production registry, or the test registry.
    pub fn for_target(config: &ReleaseConfig, bump: BumpKind, test: bool) -> Self {
        Self {
            bump,
            registries: vec![config.target_registry(test).to_owned()],
            skip_confirmation: false,
        }
    }

    #[must_use]
    pub fn skip_confirmation(mut self, skip: bool) -> Self {
        self.skip_confirmation = skip;
        self
    }
}

/// A run that ended in the `Failed` state.
#[derive(Debug, Error)]
#[error("{stage}: {cause}")]
pub struct ReleaseFailure {
    pub stage: ReleaseStage,
    #[source]
    pub cause: CoreError,
}

/// Receives progress from a running release. Every method defaults to a no-op.
/// Secrets are never passed to an observer.
#[allow(unused_variables)]
pub trait ReleaseObserver {
    fn stage_started(&mut self, stage: ReleaseStage) {}
    fn tools_resolved(&mut self, tools: &[ResolvedTool]) {}
    fn version_planned(&mut self, current: Version, target: Version) {}
    fn manifests_updated(&mut self, paths: &[PathBuf]) {}
    fn workspace_cleaned(&mut self, removed: &[PathBuf]) {}
    fn progress(&mut self, event: ProgressEvent<'_>) {}
    fn artifacts_listed(&mut self, artifacts: &[BuildArtifact]) {}
    fn credentials_validated(&mut self, registry: &str, username: &str, masked_secret: &str) {}
    fn credentials_assumed(&mut self, path: &Path) {}
    fn upload_finished(&mut self, outcome: &UploadOutcome) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ReleaseObserver for NullObserver {}

struct ObserverSink<'a>(&'a mut dyn ReleaseObserver);

impl ProgressSink for ObserverSink<'_> {
    fn event(&mut self, event: ProgressEvent<'_>) {
        self.0.progress(event);
    }
}

/// Drives one release through the stages in [`ReleaseStage`] order.
pub struct ReleaseController<'a> {
    root: PathBuf,
    config: &'a ReleaseConfig,
    resolver: Box<dyn ToolResolver + 'a>,
    credentials: CredentialStore,
    interrupt: Interrupt,
    stage: ReleaseStage,
    session: ReleaseSession,
}

impl<'a> ReleaseController<'a> {
    pub fn new(root: impl Into<PathBuf>, config: &'a ReleaseConfig) -> Self {
        Self {
            root: root.into(),
            config,
            resolver: Box::new(PathResolver::new()),
            credentials: CredentialStore::new(
                config.credentials_path(),
                config.credentials.placeholders.clone(),
            ),
            interrupt: Interrupt::new(),
            stage: ReleaseStage::Idle,
            session: ReleaseSession::default(),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ToolResolver + 'a) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn stage(&self) -> ReleaseStage {
        self.stage
    }

    pub fn session(&self) -> &ReleaseSession {
        &self.session
    }

    fn fail(&self, cause: impl Into<CoreError>) -> ReleaseFailure {
        let cause = cause.into();
        warn!("release failed while {}: {cause}", self.stage);
        ReleaseFailure {
            stage: self.stage,
            cause,
        }
    }

    fn advance(
        &mut self,
        to: ReleaseStage,
        observer: &mut dyn ReleaseObserver,
    ) -> Result<(), ReleaseFailure> {
        if self.interrupt.is_set() {
            return Err(self.fail(CoreError::Interrupted));
        }
        validate_transition(self.stage, to).map_err(|e| self.fail(e))?;
        info!("stage: {to}");
        self.stage = to;
        observer.stage_started(to);
        Ok(())
    }

    /// Run the full pipeline. A controller runs once; later calls fail with
    /// an invalid transition.
    pub fn run(
        &mut self,
        options: &ReleaseOptions,
        confirm: &mut dyn ConfirmationSource,
        observer: &mut dyn ReleaseObserver,
    ) -> Result<ReleaseReport, ReleaseFailure> {
        let config = self.config;

        self.advance(ReleaseStage::CheckingEnvironment, observer)?;
        let targets = self.resolve_targets(&options.registries)?;
        let tools = check_tools(self.resolver.as_ref(), &config.required_tools())
            .map_err(|e| self.fail(e))?;
        observer.tools_resolved(&tools);

        self.advance(ReleaseStage::ReadingVersion, observer)?;
        let store = VersionStore::from_paths(&self.root, &config.package.manifests)
            .map_err(|e| self.fail(e))?;
        let current = store.read().map_err(|e| self.fail(e))?;
        let target = current.bump(options.bump).map_err(|e| self.fail(e))?;
        self.session.current = Some(current);
        self.session.target = Some(target);
        observer.version_planned(current, target);

        if !options.skip_confirmation {
            self.advance(ReleaseStage::AwaitingConfirmation, observer)?;
            let request = ConfirmRequest::Publish {
                package: config.package.name.clone(),
                current,
                target,
                registries: targets.iter().map(|r| r.display().to_owned()).collect(),
            };
            let accepted = confirm.confirm(&request).map_err(|e| self.fail(e))?;
            if !accepted {
                return Err(self.fail(CoreError::Declined));
            }
        }
        self.session.confirmed = true;

        self.advance(ReleaseStage::WritingVersion, observer)?;
        let updated = store.write_all(target).map_err(|e| self.fail(e))?;
        observer.manifests_updated(&updated);
        self.session.updated_manifests = updated;

        self.advance(ReleaseStage::Cleaning, observer)?;
        let removed = clean_workspace(&self.root, &config.build.clean)
            .map_err(|e| self.fail(runtime_error(e)))?;
        observer.workspace_cleaned(&removed);
        self.session.removed_paths = removed;

        self.advance(ReleaseStage::Building, observer)?;
        let outcome = BuildOrchestrator::from_config(&config.build)
            .build(&self.root, &self.interrupt, &mut ObserverSink(&mut *observer))
            .map_err(|e| self.fail(runtime_error(e)))?;
        observer.artifacts_listed(&outcome.artifacts);
        self.session.artifacts = outcome.artifacts;

        self.advance(ReleaseStage::ValidatingCredentials, observer)?;
        self.validate_credentials(&targets, confirm, observer)?;

        self.advance(ReleaseStage::Uploading, observer)?;
        let uploader = UploadOrchestrator::from_config(&config.upload);
        for registry in &targets {
            let outcome = uploader
                .upload(
                    &self.session.artifacts,
                    registry,
                    &self.root,
                    &self.interrupt,
                    &mut ObserverSink(&mut *observer),
                )
                .map_err(|e| self.fail(runtime_error(e)))?;
            observer.upload_finished(&outcome);
            self.session.uploads.push(outcome);
        }

        self.advance(ReleaseStage::Done, observer)?;
        Ok(self.report(current, target, &targets))
    }

    fn resolve_targets(&self, names: &[String]) -> Result<Vec<&'a RegistryConfig>, ReleaseFailure> {
        let config = self.config;
        if names.is_empty() {
            return Err(self.fail(CoreError::UnknownRegistry(
                "no target registry given".to_owned(),
            )));
        }
        names
            .iter()
            .map(|name| {
                config
                    .registry(name)
                    .ok_or_else(|| self.fail(CoreError::UnknownRegistry(name.clone())))
            })
            .collect()
    }

    /// Validate every target before the first upload. A missing credential
    /// file is the one advisory case: the confirmation source decides whether
    /// to continue without validation.
    fn validate_credentials(
        &self,
        targets: &[&RegistryConfig],
        confirm: &mut dyn ConfirmationSource,
        observer: &mut dyn ReleaseObserver,
    ) -> Result<(), ReleaseFailure> {
        if !self.credentials.exists() {
            let path = self.credentials.path().to_path_buf();
            warn!("credential file {} not found", path.display());
            let request = ConfirmRequest::CredentialsElsewhere { path: path.clone() };
            let accepted = confirm.confirm(&request).map_err(|e| self.fail(e))?;
            if !accepted {
                return Err(self.fail(CredentialError::FileMissing(path)));
            }
            warn!("continuing without credential validation");
            observer.credentials_assumed(&path);
            return Ok(());
        }

        for registry in targets {
            let record = self
                .credentials
                .validate(registry)
                .map_err(|e| self.fail(e))?;
            observer.credentials_validated(&record.registry, &record.username, &record.masked());
        }
        Ok(())
    }

    fn report(&self, current: Version, target: Version, targets: &[&RegistryConfig]) -> ReleaseReport {
        let package = &self.config.package.name;
        let version = target.to_string();
        let uploads: Vec<UploadRecord> = self
            .session
            .uploads
            .iter()
            .zip(targets)
            .map(|(outcome, registry)| UploadRecord {
                registry: outcome.registry.clone(),
                display_name: registry.display().to_owned(),
                elapsed_secs: outcome.elapsed.as_secs_f64(),
                links: outcome.links.clone(),
                project_url: registry.render_project_url(package, &version),
                install_hint: registry.render_install_hint(package, &version),
            })
            .collect();

        ReleaseReport {
            package: package.clone(),
            previous_version: current,
            new_version: target,
            artifacts: self.session.artifacts.clone(),
            install_hint: uploads.first().and_then(|u| u.install_hint.clone()),
            uploads,
            completed_at: ReleaseReport::timestamp(Utc::now()),
        }
    }
}

fn runtime_error(e: RuntimeError) -> CoreError {
    match e {
        RuntimeError::Interrupted => CoreError::Interrupted,
        other => CoreError::Runtime(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AutoConfirm;
    use shipyard_schema::VersionError;
    use std::fs;

    struct NoTools;

    impl ToolResolver for NoTools {
        fn resolve(&self, _name: &str) -> Option<PathBuf> {
            None
        }
    }

    /// Finds everything except the listed names.
    struct Lacking(&'static [&'static str]);

    impl ToolResolver for Lacking {
        fn resolve(&self, name: &str) -> Option<PathBuf> {
            if self.0.iter().any(|lacking| *lacking == name) {
                None
            } else {
                Some(PathBuf::from("/usr/bin").join(name))
            }
        }
    }

    struct AllTools;

    impl ToolResolver for AllTools {
        fn resolve(&self, name: &str) -> Option<PathBuf> {
            Some(PathBuf::from("/usr/bin").join(name))
        }
    }

    fn package_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("setup.py"), "setup(version=\"1.3.3\")\n").unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nversion = \"1.3.3\"\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn missing_tools_fail_before_reading_version() {
        let dir = package_root();
        let config = ReleaseConfig::default();
        let mut controller = ReleaseController::new(dir.path(), &config).with_resolver(NoTools);
        let options = ReleaseOptions::for_target(&config, BumpKind::Patch, false);
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert_eq!(failure.stage, ReleaseStage::CheckingEnvironment);
        match failure.cause {
            CoreError::Runtime(RuntimeError::MissingDependencies { missing }) => {
                let names: Vec<&str> = missing.iter().map(|t| t.name.as_str()).collect();
                assert_eq!(names, vec!["python3", "pyproject-build", "twine"]);
            }
            other => panic!("unexpected cause: {other}"),
        }
        assert!(controller.session().current.is_none());
    }

    #[test]
    fn missing_uploader_fails_before_touching_manifests() {
        let dir = package_root();
        let config = ReleaseConfig::default();
        let mut controller =
            ReleaseController::new(dir.path(), &config).with_resolver(Lacking(&["twine"]));
        let options =
            ReleaseOptions::for_target(&config, BumpKind::Patch, false).skip_confirmation(true);
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert_eq!(failure.stage, ReleaseStage::CheckingEnvironment);
        match failure.cause {
            CoreError::Runtime(RuntimeError::MissingDependencies { missing }) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].name, "twine");
                assert_eq!(missing[0].install_hint, "pip install twine");
            }
            other => panic!("unexpected cause: {other}"),
        }
        assert_eq!(
            fs::read_to_string(dir.path().join("setup.py")).unwrap(),
            "setup(version=\"1.3.3\")\n"
        );
    }

    #[test]
    fn unknown_registry_rejected() {
        let dir = package_root();
        let config = ReleaseConfig::default();
        let mut controller = ReleaseController::new(dir.path(), &config).with_resolver(AllTools);
        let options = ReleaseOptions {
            bump: BumpKind::Patch,
            registries: vec!["nowhere".to_owned()],
            skip_confirmation: true,
        };
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert!(matches!(failure.cause, CoreError::UnknownRegistry(ref n) if n == "nowhere"));
    }

    #[test]
    fn malformed_version_fails_without_mutation() {
        let dir = package_root();
        fs::write(dir.path().join("setup.py"), "setup(version=\"1.3\")\n").unwrap();
        let config = ReleaseConfig::default();
        let mut controller = ReleaseController::new(dir.path(), &config).with_resolver(AllTools);
        let options =
            ReleaseOptions::for_target(&config, BumpKind::Minor, false).skip_confirmation(true);
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert_eq!(failure.stage, ReleaseStage::ReadingVersion);
        assert!(matches!(failure.cause, CoreError::Version(_)));
        assert_eq!(
            fs::read_to_string(dir.path().join("pyproject.toml")).unwrap(),
            "[project]\nversion = \"1.3.3\"\n"
        );
    }

    #[test]
    fn overflowing_bump_fails_at_reading_version() {
        let dir = package_root();
        let max = format!("{}.0.0", u64::MAX);
        fs::write(dir.path().join("setup.py"), format!("setup(version=\"{max}\")\n")).unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            format!("[project]\nversion = \"{max}\"\n"),
        )
        .unwrap();
        let config = ReleaseConfig::default();
        let mut controller = ReleaseController::new(dir.path(), &config).with_resolver(AllTools);
        let options =
            ReleaseOptions::for_target(&config, BumpKind::Major, false).skip_confirmation(true);
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert_eq!(failure.stage, ReleaseStage::ReadingVersion);
        assert!(matches!(
            failure.cause,
            CoreError::Version(VersionError::Overflow { .. })
        ));
        assert!(controller.session().target.is_none());
        assert!(fs::read_to_string(dir.path().join("setup.py"))
            .unwrap()
            .contains(&max));
    }

    #[test]
    fn preset_interrupt_fails_at_first_transition() {
        let dir = package_root();
        let config = ReleaseConfig::default();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let mut controller = ReleaseController::new(dir.path(), &config)
            .with_resolver(AllTools)
            .with_interrupt(interrupt);
        let options = ReleaseOptions::for_target(&config, BumpKind::Patch, false);
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert_eq!(failure.stage, ReleaseStage::Idle);
        assert!(matches!(failure.cause, CoreError::Interrupted));
    }

    #[test]
    fn second_run_is_an_invalid_transition() {
        let dir = package_root();
        let config = ReleaseConfig::default();
        let mut controller = ReleaseController::new(dir.path(), &config).with_resolver(NoTools);
        let options = ReleaseOptions::for_target(&config, BumpKind::Patch, false);
        let _ = controller.run(&options, &mut AutoConfirm, &mut NullObserver);
        let failure = controller
            .run(&options, &mut AutoConfirm, &mut NullObserver)
            .unwrap_err();
        assert!(matches!(failure.cause, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn failure_display_names_stage() {
        let failure = ReleaseFailure {
            stage: ReleaseStage::Building,
            cause: CoreError::Interrupted,
        };
        assert_eq!(failure.to_string(), "building: interrupted");
    }
}
