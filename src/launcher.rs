//! Starts the supervised child executable.
use std::{
    path::Path,
    process::{ChildStderr, ChildStdout, Command, Stdio},
};

use tracing::{debug, error, warn};

use crate::error::LaunchError;
use crate::liveness::ProcessHandle;

/// How the child's stdout and stderr are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Both streams are piped back to the supervisor.
    Capture,
    /// Both streams are connected to the null device.
    Discard,
}

impl StdioMode {
    pub fn from_capture(capture_output: bool) -> Self {
        if capture_output {
            StdioMode::Capture
        } else {
            StdioMode::Discard
        }
    }

    fn stdio(&self) -> Stdio {
        match self {
            StdioMode::Capture => Stdio::piped(),
            StdioMode::Discard => Stdio::null(),
        }
    }
}

/// A freshly spawned child and the read ends of its output pipes.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub handle: ProcessHandle,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Spawns `executable` with no arguments and the inherited environment.
///
/// `working_dir` is applied only if it exists; otherwise the child inherits the
/// supervisor's own working directory. Stdin is always the null device. Returns as
/// soon as the OS has created the process.
pub fn launch(
    working_dir: &Path,
    executable: &Path,
    stdio: StdioMode,
) -> Result<LaunchedProcess, LaunchError> {
    debug!(
        "Launching {} in {} ({stdio:?})",
        executable.display(),
        working_dir.display()
    );

    let mut cmd = Command::new(executable);
    if working_dir.is_dir() {
        cmd.current_dir(working_dir);
    } else {
        warn!(
            "Working directory {} does not exist; keeping the current one",
            working_dir.display()
        );
    }

    cmd.stdin(Stdio::null())
        .stdout(stdio.stdio())
        .stderr(stdio.stdio());

    match cmd.spawn() {
        Ok(mut child) => {
            let pid = child.id();
            debug!("Launched {} with PID {pid}", executable.display());

            // The handle takes over waiting; dropping `Child` neither kills nor reaps.
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            Ok(LaunchedProcess {
                handle: ProcessHandle::new(pid),
                stdout,
                stderr,
            })
        }
        Err(source) => {
            error!("Failed to launch {}: {source}", executable.display());
            Err(LaunchError {
                executable: executable.to_path_buf(),
                source,
            })
        }
    }
}
