//! Streaming subprocess execution.
//!
//! stdout and stderr are drained by one reader thread each and merged at line
//! granularity through a channel. The calling thread receives lines as they
//! arrive and polls the [`Interrupt`] between receives, killing the child when
//! it is set. It also polls the child itself: once the child has exited and
//! its output has gone quiet for a short grace period, the run ends even if a
//! background process it left behind still holds the pipes open.

use crate::interrupt::Interrupt;
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A program invocation: argv, working directory, and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Split `argv` into program and arguments.
    pub fn from_argv(argv: &[String], working_dir: &Path) -> Result<Self, RuntimeError> {
        let (program, args) = argv.split_first().ok_or(RuntimeError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: working_dir.to_path_buf(),
            env: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run `spec` to completion, handing each output line to `on_line`.
///
/// Trailing `\r`/`\n` are stripped and invalid UTF-8 is replaced. The exit
/// status is returned unjudged; callers decide what counts as failure.
pub fn run_streaming<F>(
    spec: &CommandSpec,
    interrupt: &Interrupt,
    mut on_line: F,
) -> Result<ExitStatus, RuntimeError>
where
    F: FnMut(Stream, &str),
{
    if interrupt.is_set() {
        return Err(RuntimeError::Interrupted);
    }

    debug!("spawning: {}", spec.command_line());
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RuntimeError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    let (tx, rx) = mpsc::channel::<(Stream, String)>();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let mut exited: Option<(ExitStatus, Instant)> = None;
    loop {
        let idle = match rx.recv_timeout(POLL_INTERVAL) {
            Ok((stream, line)) => {
                on_line(stream, &line);
                false
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if interrupt.is_set() {
            terminate(&mut child, &spec.program);
            // Readers finish on their own once every holder of the pipes exits.
            return Err(RuntimeError::Interrupted);
        }
        if exited.is_none() {
            exited = child.try_wait()?.map(|status| (status, Instant::now()));
        }
        if let Some((status, at)) = exited {
            if idle && at.elapsed() >= DRAIN_GRACE {
                warn!(
                    "{} exited with {status} but its output is still open; \
                     a background process it started may be holding it",
                    spec.program
                );
                return Ok(status);
            }
        }
    }

    for reader in readers {
        if reader.join().is_err() {
            warn!("output reader for {} panicked", spec.program);
        }
    }
    let status = match exited {
        Some((status, _)) => status,
        None => child.wait()?,
    };
    debug!("{} exited with {status}", spec.program);
    Ok(status)
}

fn spawn_reader<R>(source: R, stream: Stream, tx: Sender<(Stream, String)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn terminate(child: &mut Child, program: &str) {
    debug!("interrupt received, killing {program}");
    let _ = child.kill();
    let _ = child.wait();
}

/// Render an exit status for messages: `exit code N` or `terminated by signal`.
pub fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, dir: &Path) -> CommandSpec {
        CommandSpec::from_argv(
            &["sh".to_owned(), "-c".to_owned(), script.to_owned()],
            dir,
        )
        .unwrap()
    }

    #[test]
    fn merges_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        let status = run_streaming(
            &sh("echo out; echo err >&2; echo out2", dir.path()),
            &Interrupt::new(),
            |stream, line| seen.push((stream, line.to_owned())),
        )
        .unwrap();
        assert!(status.success());
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&(Stream::Stderr, "err".to_owned())));
        let stdout: Vec<_> = seen
            .iter()
            .filter(|(s, _)| *s == Stream::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, vec!["out", "out2"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        run_streaming(
            &sh("printf 'ok\\377\\r\\n'", dir.path()),
            &Interrupt::new(),
            |_, line| seen.push(line.to_owned()),
        )
        .unwrap();
        assert_eq!(seen, vec!["ok\u{FFFD}"]);
    }

    #[test]
    fn env_and_working_dir_applied() {
        let dir = tempfile::tempdir().unwrap();
        let env = BTreeMap::from([("SHIPYARD_TEST_VAR".to_owned(), "utf-8".to_owned())]);
        let mut seen = Vec::new();
        run_streaming(
            &sh("echo $SHIPYARD_TEST_VAR; pwd", dir.path()).with_env(&env),
            &Interrupt::new(),
            |_, line| seen.push(line.to_owned()),
        )
        .unwrap();
        assert_eq!(seen[0], "utf-8");
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(Path::new(&seen[1]).canonicalize().unwrap(), canonical);
    }

    #[test]
    fn nonzero_status_is_returned_not_judged() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_streaming(&sh("exit 3", dir.path()), &Interrupt::new(), |_, _| {})
            .unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(describe_status(status), "exit code 3");
    }

    #[test]
    fn spawn_failure_names_program() {
        let dir = tempfile::tempdir().unwrap();
        let spec =
            CommandSpec::from_argv(&["shipyard-no-such-program".to_owned()], dir.path()).unwrap();
        let err = run_streaming(&spec, &Interrupt::new(), |_, _| {}).unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { ref program, .. } if program == "shipyard-no-such-program"));
    }

    #[test]
    fn interrupt_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        let started = Instant::now();
        let err = run_streaming(
            &sh("echo started; exec sleep 30", dir.path()),
            &interrupt,
            |_, _| trigger.trigger(),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn exited_child_is_not_held_by_inherited_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        let started = Instant::now();
        let status = run_streaming(
            &sh("sleep 10 & echo done; exit 4", dir.path()),
            &Interrupt::new(),
            |_, line| seen.push(line.to_owned()),
        )
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(status.code(), Some(4));
        assert_eq!(seen, vec!["done"]);
    }

    #[test]
    fn output_after_exit_is_still_drained() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = 0;
        let status = run_streaming(
            &sh("i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done", dir.path()),
            &Interrupt::new(),
            |_, _| seen += 1,
        )
        .unwrap();
        assert!(status.success());
        assert_eq!(seen, 2000);
    }

    #[test]
    fn preset_interrupt_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let marker = dir.path().join("ran");
        let err = run_streaming(
            &sh(&format!("touch {}", marker.display()), dir.path()),
            &interrupt,
            |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Interrupted));
        assert!(!marker.exists());
    }

    #[test]
    fn empty_argv_rejected() {
        assert!(matches!(
            CommandSpec::from_argv(&[], Path::new(".")),
            Err(RuntimeError::EmptyCommand)
        ));
    }
}
