//! Warden keeps a single child executable running as an OS service. The child lives
//! next to the warden binary, is relaunched whenever it dies, and has its stdout and
//! stderr forwarded into warden's own log.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Shared constants.
pub mod constants;

/// Error handling.
pub mod error;

/// Service manager registration (systemd and launchd).
pub mod install;

/// Child process launching.
pub mod launcher;

/// Liveness checks and reaping for the tracked child.
pub mod liveness;

/// Logging setup and the sink child output is forwarded into.
pub mod logs;

/// Output stream pumps.
pub mod pump;

/// Root directory resolution.
pub mod runtime;

/// The service instance driven by `warden run`.
pub mod service;

/// Restart-on-death supervision loop.
pub mod supervisor;

/// Helpers shared by unit and integration tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
