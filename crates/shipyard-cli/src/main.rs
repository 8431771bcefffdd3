mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use shipyard_schema::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "shipyard",
    version,
    about = "Bump, build, and publish a Python package to a package registry"
)]
struct Cli {
    /// Path to the release configuration, relative to the package root.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Package root directory.
    #[arg(short = 'C', long, default_value = ".", global = true)]
    root: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bump the version, build, and upload the package.
    Publish {
        /// Bump kind (patch, minor, major) or an explicit X.Y.Z version.
        #[arg(default_value = "patch")]
        version: String,
        /// Upload to the test registry instead of production.
        #[arg(long, default_value_t = false)]
        test: bool,
        /// Do not ask for confirmation.
        #[arg(short = 'y', long, default_value_t = false)]
        skip_confirm: bool,
    },
    /// Check tools, configuration, manifests, and credentials.
    Doctor,
    /// Interactively write the registry credential file.
    Setup,
    /// Show the current version and, optionally, the next one.
    Version {
        /// Bump kind (patch, minor, major) or an explicit X.Y.Z version.
        bump: Option<String>,
    },
    /// Look up the native library download URL for a platform.
    Library {
        /// Operating system (windows, linux, darwin).
        #[arg(required_unless_present = "list")]
        system: Option<String>,
        /// Pointer width (32 or 64).
        #[arg(required_unless_present = "list")]
        arch: Option<String>,
        /// List every known entry.
        #[arg(long, default_value_t = false, conflicts_with_all = ["system", "arch"])]
        list: bool,
    },
    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
    /// Generate man pages.
    ManPages {
        /// Output directory.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SHIPYARD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let ctx = commands::Context {
        root: cli.root.clone(),
        config_path: cli.root.join(&cli.config),
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Publish {
            version,
            test,
            skip_confirm,
        } => commands::publish::run(&ctx, &version, test, skip_confirm),
        Commands::Doctor => commands::doctor::run(&ctx),
        Commands::Setup => commands::setup::run(&ctx),
        Commands::Version { bump } => commands::version::run(&ctx, bump.as_deref()),
        Commands::Library { system, arch, list } => {
            commands::library::run(&ctx, system.as_deref(), arch.as_deref(), list)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
