use super::{json_pretty, spin_fail, spin_ok, spinner, Context, TerminalConfirm};
use super::{EXIT_FAILURE, EXIT_SUCCESS};
use console::Style;
use indicatif::ProgressBar;
use shipyard_core::{
    install_signal_handler, AutoConfirm, ConfirmationSource, CoreError, NullObserver,
    ReleaseController, ReleaseFailure, ReleaseLock, ReleaseObserver, ReleaseOptions,
    ReleaseReport, ReleaseStage,
};
use shipyard_remote::CredentialError;
use shipyard_runtime::{
    format_missing, BuildArtifact, BuildPhase, Interrupt, ProgressEvent, ResolvedTool,
    RuntimeError, UploadLineKind, UploadOutcome,
};
use shipyard_schema::{BumpKind, ReleaseConfig, Version, VersionError};
use std::path::{Path, PathBuf};

pub fn run(ctx: &Context, version: &str, test: bool, skip_confirm: bool) -> Result<u8, String> {
    let config = ctx.load_config()?;
    let bump: BumpKind = version.parse().map_err(|e: VersionError| e.to_string())?;

    let lock_path = ReleaseLock::path_for(&ctx.root);
    let _lock = ReleaseLock::try_acquire(&lock_path)
        .map_err(|e| format!("release lock: {e}"))?
        .ok_or_else(|| "another release is in progress".to_owned())?;

    let interrupt = Interrupt::new();
    install_signal_handler(&interrupt);

    let options = ReleaseOptions::for_target(&config, bump, test).skip_confirmation(skip_confirm);
    let mut controller =
        ReleaseController::new(&ctx.root, &config).with_interrupt(interrupt.clone());

    let mut auto = AutoConfirm;
    let mut terminal = TerminalConfirm::new(interrupt);
    let confirm: &mut dyn ConfirmationSource = if skip_confirm {
        &mut auto
    } else {
        &mut terminal
    };

    let mut console = ConsoleObserver::default();
    let mut null = NullObserver;
    let observer: &mut dyn ReleaseObserver = if ctx.json { &mut null } else { &mut console };

    match controller.run(&options, confirm, observer) {
        Ok(report) => {
            if ctx.json {
                println!("{}", json_pretty(&report)?);
            } else {
                console.finish();
                print_report(&report);
            }
            Ok(EXIT_SUCCESS)
        }
        Err(failure) => {
            if ctx.json {
                println!("{}", json_pretty(&failure_json(&failure))?);
            } else {
                console.abort();
                print_failure(&failure, &config);
                let session = controller.session();
                if let Some(target) = session.target {
                    if !session.updated_manifests.is_empty() {
                        eprintln!("\nmanifests already carry {target}; once fixed, rerun with:");
                        eprintln!("  shipyard publish {target}");
                    }
                }
            }
            Ok(EXIT_FAILURE)
        }
    }
}

/// Renders controller progress. Stages with subprocess output run under a
/// spinner; their lines are printed above it.
#[derive(Default)]
struct ConsoleObserver {
    current: Option<(ReleaseStage, ProgressBar)>,
}

impl ConsoleObserver {
    fn finish(&mut self) {
        if let Some((stage, pb)) = self.current.take() {
            spin_ok(&pb, stage.label());
        }
    }

    fn abort(&mut self) {
        if let Some((stage, pb)) = self.current.take() {
            spin_fail(&pb, stage.label());
        }
    }

    fn line(&self, text: &str) {
        match &self.current {
            Some((_, pb)) if !pb.is_hidden() => pb.println(text),
            _ => println!("{text}"),
        }
    }
}

impl ReleaseObserver for ConsoleObserver {
    fn stage_started(&mut self, stage: ReleaseStage) {
        self.finish();
        match stage {
            // These stages may prompt; a ticking spinner would garble the prompt.
            ReleaseStage::AwaitingConfirmation
            | ReleaseStage::ValidatingCredentials
            | ReleaseStage::Done => {}
            _ => self.current = Some((stage, spinner(&format!("{}...", stage.label())))),
        }
    }

    fn tools_resolved(&mut self, tools: &[ResolvedTool]) {
        for tool in tools {
            self.line(&format!("  {} {}", tool.name, tool.path.display()));
        }
    }

    fn version_planned(&mut self, current: Version, target: Version) {
        let bold = Style::new().bold();
        self.line(&format!(
            "  version {} -> {}",
            current,
            bold.apply_to(target)
        ));
    }

    fn manifests_updated(&mut self, paths: &[PathBuf]) {
        for path in paths {
            self.line(&format!("  updated {}", path.display()));
        }
    }

    fn workspace_cleaned(&mut self, removed: &[PathBuf]) {
        for path in removed {
            self.line(&format!("  removed {}", path.display()));
        }
    }

    fn progress(&mut self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::BuildPhase(phase) => {
                let msg = match phase {
                    BuildPhase::Source => "building source distribution",
                    BuildPhase::Binary => "building wheel",
                    BuildPhase::Built => "build finished",
                };
                self.line(&format!("  {}", Style::new().cyan().apply_to(msg)));
            }
            ProgressEvent::BuildOutput(line) => {
                self.line(&format!("  {}", Style::new().dim().apply_to(line)));
            }
            ProgressEvent::UploadOutput { kind, line } => {
                let style = match kind {
                    UploadLineKind::Progress => Style::new().cyan(),
                    UploadLineKind::CompletionLink => Style::new().green(),
                    UploadLineKind::Error => Style::new().red(),
                    UploadLineKind::Warning => Style::new().yellow(),
                    UploadLineKind::Other => return,
                };
                self.line(&format!("  {}", style.apply_to(line)));
            }
        }
    }

    fn artifacts_listed(&mut self, artifacts: &[BuildArtifact]) {
        for artifact in artifacts {
            self.line(&format!(
                "  {} ({:.2} MiB)",
                artifact.file_name,
                artifact.size_mib()
            ));
        }
    }

    fn credentials_validated(&mut self, registry: &str, username: &str, masked_secret: &str) {
        println!("  {registry}: {username} {masked_secret}");
    }

    fn credentials_assumed(&mut self, path: &Path) {
        let yellow = Style::new().yellow();
        println!(
            "  {}",
            yellow.apply_to(format!(
                "no credential file at {}; relying on the upload tool",
                path.display()
            ))
        );
    }

    fn upload_finished(&mut self, outcome: &UploadOutcome) {
        self.line(&format!(
            "  uploaded to {} in {:.1}s",
            outcome.registry,
            outcome.elapsed.as_secs_f64()
        ));
    }
}

fn print_report(report: &ReleaseReport) {
    let green = Style::new().green().bold();
    println!();
    println!(
        "{} {} {} -> {}",
        green.apply_to("released"),
        report.package,
        report.previous_version,
        report.new_version
    );
    for artifact in &report.artifacts {
        println!("  {} ({:.2} MiB)", artifact.file_name, artifact.size_mib());
    }
    println!(
        "  total {:.2} MiB",
        report.total_size() as f64 / 1024.0 / 1024.0
    );
    for upload in &report.uploads {
        println!("{} ({:.1}s)", upload.display_name, upload.elapsed_secs);
        if let Some(url) = &upload.project_url {
            println!("  project: {url}");
        }
        for link in &upload.links {
            println!("  view at: {link}");
        }
        if let Some(hint) = &upload.install_hint {
            println!("  install: {hint}");
        }
    }
    println!("completed at {}", report.completed_at);
}

fn print_failure(failure: &ReleaseFailure, config: &ReleaseConfig) {
    let red = Style::new().red().bold();
    eprintln!("{} {failure}", red.apply_to("error:"));

    match &failure.cause {
        CoreError::Runtime(RuntimeError::MissingDependencies { missing }) => {
            eprintln!("{}", format_missing(missing));
        }
        CoreError::Runtime(RuntimeError::BuildFailed { transcript, .. }) => {
            eprintln!("\nbuild output:");
            for line in transcript {
                eprintln!("  {line}");
            }
        }
        CoreError::Runtime(RuntimeError::UploadFailed {
            registry,
            tail,
            total_lines,
            ..
        }) => {
            eprintln!("\n{}:", tail_heading(tail.len(), *total_lines));
            for line in tail {
                eprintln!("  {line}");
            }
            eprintln!("\npossible causes:");
            eprintln!("  - the token is invalid, expired, or lacks upload scope");
            eprintln!("  - this version already exists on the registry");
            eprintln!("  - the network is unreachable");
            credential_hints(config, Some(registry.as_str()));
        }
        CoreError::Credential(e) => {
            let registry = match e {
                CredentialError::CredentialMissing { registry, .. }
                | CredentialError::CredentialMalformed { registry, .. } => Some(registry.as_str()),
                _ => None,
            };
            credential_hints(config, registry);
        }
        _ => {}
    }
}

fn tail_heading(shown: usize, total: usize) -> String {
    if shown < total {
        format!("last {shown} of {total} lines of upload output")
    } else {
        format!("upload output ({total} lines)")
    }
}

fn credential_hints(config: &ReleaseConfig, registry: Option<&str>) {
    eprintln!("\ncredential file: {}", config.credentials_path().display());
    eprintln!("run `shipyard setup` to write it, or `shipyard doctor` to inspect it");
    if let Some(url) = registry
        .and_then(|name| config.registry(name))
        .and_then(|r| r.token_url.as_deref())
    {
        eprintln!("create a token at {url}");
    }
}

fn failure_json(failure: &ReleaseFailure) -> serde_json::Value {
    let mut value = serde_json::json!({
        "status": "failed",
        "stage": failure.stage,
        "error": failure.cause.to_string(),
    });
    match &failure.cause {
        CoreError::Runtime(RuntimeError::BuildFailed { transcript, .. }) => {
            value["transcript"] = serde_json::json!(transcript);
        }
        CoreError::Runtime(RuntimeError::UploadFailed {
            tail, total_lines, ..
        }) => {
            value["tail"] = serde_json::json!(tail);
            value["total_lines"] = serde_json::json!(total_lines);
        }
        CoreError::Runtime(RuntimeError::MissingDependencies { missing }) => {
            value["missing"] = serde_json::json!(missing);
        }
        _ => {}
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_json_carries_transcript() {
        let failure = ReleaseFailure {
            stage: ReleaseStage::Building,
            cause: CoreError::Runtime(RuntimeError::BuildFailed {
                status: "exit code 1".to_owned(),
                transcript: vec!["error: invalid command".to_owned()],
            }),
        };
        let json = failure_json(&failure);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "building");
        assert_eq!(json["transcript"][0], "error: invalid command");
        assert!(json.get("tail").is_none());
    }

    #[test]
    fn failure_json_carries_upload_tail() {
        let failure = ReleaseFailure {
            stage: ReleaseStage::Uploading,
            cause: CoreError::Runtime(RuntimeError::UploadFailed {
                registry: "pypi".to_owned(),
                status: "exit code 1".to_owned(),
                tail: vec!["HTTPError: 403 Forbidden".to_owned()],
                total_lines: 42,
            }),
        };
        let json = failure_json(&failure);
        assert_eq!(json["tail"][0], "HTTPError: 403 Forbidden");
        assert_eq!(json["total_lines"], 42);
        assert!(json["error"].as_str().unwrap().contains("pypi"));
    }

    #[test]
    fn tail_heading_says_when_output_was_cut() {
        assert_eq!(tail_heading(20, 57), "last 20 of 57 lines of upload output");
        assert_eq!(tail_heading(3, 3), "upload output (3 lines)");
    }

    #[test]
    fn console_observer_tracks_spinner_stages() {
        let mut console = ConsoleObserver::default();
        console.stage_started(ReleaseStage::CheckingEnvironment);
        assert!(console.current.is_some());
        console.stage_started(ReleaseStage::AwaitingConfirmation);
        assert!(console.current.is_none());
        console.stage_started(ReleaseStage::Building);
        console.abort();
        assert!(console.current.is_none());
    }
}
