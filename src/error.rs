//! Error handling for warden.
use std::path::PathBuf;

use thiserror::Error;

/// Defines all possible errors that can surface from the supervisor.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration could not be loaded. Fatal at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The child executable could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The OS could not report whether the child is still running.
    #[error(transparent)]
    Liveness(#[from] LivenessError),

    /// The root working directory could not be resolved or entered.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Registering or removing the OS service failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A supervisor or pump thread could not be spawned.
    #[error("Failed to spawn thread: {0}")]
    Thread(#[source] std::io::Error),

    /// Logging could not be initialised.
    #[error("Failed to initialise logging: {0}")]
    Logging(String),

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `WardenError`.
impl<T> From<std::sync::PoisonError<T>> for WardenError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        WardenError::MutexPoisonError(err.to_string())
    }
}

/// Errors raised while loading `warden.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `${VAR}` reference names an unset environment variable.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Error spawning the child executable.
#[derive(Debug, Error)]
#[error("Failed to launch {executable:?}: {source}")]
pub struct LaunchError {
    /// Executable that failed to start.
    pub executable: PathBuf,
    /// The underlying OS error.
    #[source]
    pub source: std::io::Error,
}

/// Error querying the OS about the tracked process.
#[derive(Debug, Error)]
#[error("Failed to query process {pid}: {source}")]
pub struct LivenessError {
    /// PID that was being queried.
    pub pid: u32,
    /// The underlying errno.
    #[source]
    pub source: nix::errno::Errno,
}

/// Error reading from one of the child's output pipes.
#[derive(Debug, Error)]
#[error("Failed to read child {stream}: {source}")]
pub struct PipeError {
    /// Stream name (`stdout` or `stderr`).
    pub stream: &'static str,
    /// The underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Errors raised while resolving the root working directory.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The path of the running executable is unavailable.
    #[error("Failed to resolve current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    /// The executable path has no parent directory.
    #[error("Executable {0:?} has no parent directory")]
    NoParent(PathBuf),

    /// Changing into the root directory failed.
    #[error("Failed to enter {path:?}: {source}")]
    EnterRoot {
        /// Root directory.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while installing or uninstalling the OS service.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Writing or removing the service definition failed.
    #[error("Failed to access service definition {path:?}: {source}")]
    Io {
        /// Definition path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Rendering the launchd definition failed.
    #[error("Failed to render launchd definition: {0}")]
    Plist(#[from] plist::Error),

    /// A service manager command could not be run.
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A service manager command exited unsuccessfully.
    #[error("`{command}` exited with status {code:?}")]
    CommandFailed {
        /// Command line that failed.
        command: String,
        /// Exit code, if the command was not killed by a signal.
        code: Option<i32>,
    },

    /// No supported service manager exists on this platform.
    #[error("Service installation is not supported on this platform")]
    UnsupportedPlatform,
}
