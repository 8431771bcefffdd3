pub mod completions;
pub mod doctor;
pub mod library;
pub mod man_pages;
pub mod publish;
pub mod setup;
pub mod version;

use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use shipyard_core::{ConfirmRequest, ConfirmationSource, CoreError};
use shipyard_runtime::Interrupt;
use shipyard_schema::ReleaseConfig;
use std::io::{stderr, stdin, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Resolved global flags shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub json: bool,
}

impl Context {
    pub fn load_config(&self) -> Result<ReleaseConfig, String> {
        ReleaseConfig::load(&self.config_path).map_err(|e| format!("config error: {e}"))
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn is_interactive() -> bool {
    stdin().is_terminal() && stderr().is_terminal()
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Asks the operator on the terminal. Falls back to reading one line from
/// stdin when no terminal is attached; end of input declines.
pub struct TerminalConfirm {
    interrupt: Interrupt,
}

impl TerminalConfirm {
    pub fn new(interrupt: Interrupt) -> Self {
        Self { interrupt }
    }

    fn ask_tty(prompt: &str) -> Result<bool, CoreError> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| match e {
                dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
                    CoreError::Interrupted
                }
                other => CoreError::Prompt(other.to_string()),
            })
    }

    fn ask_line(prompt: &str) -> Result<bool, CoreError> {
        let mut err = stderr();
        write!(err, "{prompt} [y/N] ").map_err(|e| CoreError::Prompt(e.to_string()))?;
        err.flush().map_err(|e| CoreError::Prompt(e.to_string()))?;
        let mut line = String::new();
        stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| CoreError::Prompt(e.to_string()))?;
        Ok(parse_reply(&line))
    }
}

impl ConfirmationSource for TerminalConfirm {
    fn confirm(&mut self, request: &ConfirmRequest) -> Result<bool, CoreError> {
        let prompt = request.prompt();
        let accepted = if is_interactive() {
            Self::ask_tty(&prompt)?
        } else {
            Self::ask_line(&prompt)?
        };
        if self.interrupt.is_set() {
            return Err(CoreError::Interrupted);
        }
        Ok(accepted)
    }
}

fn parse_reply(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
