use crate::artifacts::{inventory, BuildArtifact};
use crate::events::{ProgressEvent, ProgressSink};
use crate::interrupt::Interrupt;
use crate::process::{describe_status, run_streaming, CommandSpec};
use crate::transcript::Transcript;
use crate::RuntimeError;
use serde::Serialize;
use shipyard_schema::BuildSection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Display-only build progress markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Source,
    Binary,
    Built,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildLine {
    Blank,
    Noise,
    Phase(BuildPhase),
    Output,
}

pub fn classify_build_line(line: &str, noise: &[String]) -> BuildLine {
    if line.trim().is_empty() {
        BuildLine::Blank
    } else if noise.iter().any(|n| !n.is_empty() && line.contains(n.as_str())) {
        BuildLine::Noise
    } else if line.contains("Building sdist") {
        BuildLine::Phase(BuildPhase::Source)
    } else if line.contains("Building wheel") {
        BuildLine::Phase(BuildPhase::Binary)
    } else if line.contains("Successfully built") {
        BuildLine::Phase(BuildPhase::Built)
    } else {
        BuildLine::Output
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub artifacts: Vec<BuildArtifact>,
    pub elapsed: Duration,
    pub transcript: Vec<String>,
}

/// Runs the package build command and collects its artifacts.
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    noise: Vec<String>,
    output_dir: PathBuf,
}

impl BuildOrchestrator {
    pub fn new(command: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            env: BTreeMap::new(),
            noise: Vec::new(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(build: &BuildSection) -> Self {
        Self {
            command: build.command.clone(),
            env: build.env.clone(),
            noise: build.noise.clone(),
            output_dir: build.output_dir.clone(),
        }
    }

    #[must_use]
    pub fn with_noise(mut self, noise: Vec<String>) -> Self {
        self.noise = noise;
        self
    }

    /// Output directory resolved against `working_dir`.
    pub fn output_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.output_dir)
    }

    /// Run the build. Success is decided by the exit status alone; output text
    /// never turns a failing build into a passing one or the reverse.
    pub fn build(
        &self,
        working_dir: &Path,
        interrupt: &Interrupt,
        sink: &mut dyn ProgressSink,
    ) -> Result<BuildOutcome, RuntimeError> {
        let spec = CommandSpec::from_argv(&self.command, working_dir)?.with_env(&self.env);
        info!("building: {}", spec.command_line());

        let started = Instant::now();
        let mut transcript = Transcript::unbounded();
        let status = run_streaming(&spec, interrupt, |_, line| {
            match classify_build_line(line, &self.noise) {
                BuildLine::Blank => return,
                BuildLine::Noise => {}
                BuildLine::Phase(phase) => sink.event(ProgressEvent::BuildPhase(phase)),
                BuildLine::Output => sink.event(ProgressEvent::BuildOutput(line)),
            }
            transcript.push(line);
        })?;

        if !status.success() {
            return Err(RuntimeError::BuildFailed {
                status: describe_status(status),
                transcript: transcript.into_lines(),
            });
        }

        let artifacts = inventory(&self.output_dir(working_dir))?;
        let elapsed = started.elapsed();
        info!(
            "build produced {} artifact(s) in {:.2}s",
            artifacts.len(),
            elapsed.as_secs_f64()
        );
        Ok(BuildOutcome {
            artifacts,
            elapsed,
            transcript: transcript.into_lines(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise() -> Vec<String> {
        shipyard_schema::BuildSection::default().noise
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<BuildPhase>,
        lines: Vec<String>,
    }

    impl ProgressSink for Recorder {
        fn event(&mut self, event: ProgressEvent<'_>) {
            match event {
                ProgressEvent::BuildPhase(p) => self.phases.push(p),
                ProgressEvent::BuildOutput(l) => self.lines.push(l.to_owned()),
                ProgressEvent::UploadOutput { .. } => {}
            }
        }
    }

    #[test]
    fn classification() {
        let n = noise();
        assert_eq!(classify_build_line("   ", &n), BuildLine::Blank);
        assert_eq!(
            classify_build_line("SetuptoolsDeprecationWarning: License classifiers", &n),
            BuildLine::Noise
        );
        assert_eq!(classify_build_line("!!", &n), BuildLine::Noise);
        assert_eq!(
            classify_build_line("        ********************************", &n),
            BuildLine::Noise
        );
        assert_eq!(
            classify_build_line("* Building sdist...", &n),
            BuildLine::Phase(BuildPhase::Source)
        );
        assert_eq!(
            classify_build_line("* Building wheel from sdist", &n),
            BuildLine::Phase(BuildPhase::Binary)
        );
        assert_eq!(
            classify_build_line("Successfully built a.tar.gz and a.whl", &n),
            BuildLine::Phase(BuildPhase::Built)
        );
        assert_eq!(classify_build_line("running egg_info", &n), BuildLine::Output);
    }

    #[cfg(unix)]
    fn sh_build(script: &str) -> BuildOrchestrator {
        BuildOrchestrator::new(
            vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()],
            "dist",
        )
        .with_noise(noise())
    }

    #[cfg(unix)]
    #[test]
    fn successful_build_lists_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let build = sh_build(
            "echo '* Building sdist...'; echo 'Please use pyproject'; echo; \
             mkdir -p dist; printf abc > dist/pkg-1.0.0.tar.gz; printf abcd > dist/pkg-1.0.0-py3-none-any.whl; \
             echo 'Successfully built pkg-1.0.0.tar.gz'",
        );
        let mut sink = Recorder::default();
        let outcome = build
            .build(dir.path(), &Interrupt::new(), &mut sink)
            .unwrap();
        assert_eq!(outcome.artifacts.len(), 2);
        assert_eq!(outcome.artifacts[0].file_name, "pkg-1.0.0-py3-none-any.whl");
        assert_eq!(sink.phases, vec![BuildPhase::Source, BuildPhase::Built]);
        assert!(sink.lines.is_empty());
        // noise kept, blank dropped
        assert_eq!(outcome.transcript.len(), 3);
        assert!(outcome.transcript.iter().any(|l| l.contains("Please use")));
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_with_no_output_is_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh_build("true")
            .build(dir.path(), &Interrupt::new(), &mut crate::NullSink)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NoArtifactsProduced(_)));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_fails_despite_success_text() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh_build(
            "mkdir -p dist; touch dist/x.whl; echo 'Successfully built x.whl'; echo boom >&2; exit 1",
        )
        .build(dir.path(), &Interrupt::new(), &mut crate::NullSink)
        .unwrap_err();
        match err {
            RuntimeError::BuildFailed { status, transcript } => {
                assert_eq!(status, "exit code 1");
                assert!(transcript.iter().any(|l| l == "boom"));
                assert!(transcript.iter().any(|l| l.contains("Successfully built")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn env_is_passed_to_build() {
        let dir = tempfile::tempdir().unwrap();
        let build = BuildOrchestrator::from_config(&BuildSection {
            command: vec![
                "sh".to_owned(),
                "-c".to_owned(),
                "mkdir -p dist; echo \"$PYTHONUTF8\" > dist/env.txt".to_owned(),
            ],
            ..BuildSection::default()
        });
        let outcome = build
            .build(dir.path(), &Interrupt::new(), &mut crate::NullSink)
            .unwrap();
        let content = std::fs::read_to_string(&outcome.artifacts[0].path).unwrap();
        assert_eq!(content.trim(), "1");
    }
}
