//! Command-line interface for warden.
use std::{fmt, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// A log level given on the command line, e.g. `debug` or `4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    pub fn filter(&self) -> LevelFilter {
        self.0
    }
}

impl fmt::Display for LogLevelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // LevelFilter renders in upper case; EnvFilter directives are lower case.
        write!(f, "{}", self.0.to_string().to_ascii_lowercase())
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        LevelFilter::from_str(trimmed)
            .map(LogLevelArg)
            .map_err(|_| format!("invalid log level '{trimmed}' (expected off, error, warn, info, debug, trace or 0-5)"))
    }
}

/// Command-line interface for warden.
#[derive(Parser, Debug)]
#[command(name = "warden", version)]
#[command(about = "Keeps a single child executable running as an OS service", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute. Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for warden.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Register warden with the OS service manager and start it.
    Install,

    /// Stop the registered service and remove it from the service manager.
    Uninstall,

    /// Supervise the child in the foreground until interrupted.
    Run,

    /// Ask the OS service manager about the registered service.
    Status,
}

impl Cli {
    /// The selected command, falling back to `run` when none was given.
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
