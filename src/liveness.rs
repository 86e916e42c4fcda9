//! Process handles and liveness checks.
//!
//! A liveness check blocks until the tracked process changes state. It is meant to run
//! on the supervision thread, where blocking is the point: the check returns once the
//! child has exited (or the OS reports an error), and the caller relaunches.
use nix::{
    errno::Errno,
    sys::{
        signal::{self, Signal},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::Pid,
};
use tracing::{debug, warn};

use crate::error::LivenessError;

/// How a tracked process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(Signal),
    /// The PID no longer resolves to a process; the status is unknown.
    Vanished,
}

/// Opaque handle to a spawned child: its PID plus wait and kill capability.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Pid,
    exit: Option<ExitOutcome>,
    reaped: bool,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid: Pid::from_raw(pid as i32),
            exit: None,
            reaped: false,
        }
    }

    /// Platform process identifier.
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// How the process ended, once a liveness check has observed it.
    pub fn exit(&self) -> Option<ExitOutcome> {
        self.exit
    }

    /// Sends `SIGKILL`. A process that is already gone is not an error.
    pub fn kill(&self) -> Result<(), LivenessError> {
        kill_pid(self.pid())
    }

    /// Collects the exit status of an exited child so it does not linger as a zombie.
    ///
    /// After this returns the PID may be reused by the OS; callers must have stopped
    /// publishing it for kills before reaping.
    pub fn reap(&mut self) {
        if self.reaped || self.exit.is_none() {
            return;
        }
        match waitpid(self.pid, None) {
            Ok(status) => debug!("Reaped PID {}: {status:?}", self.pid),
            Err(Errno::ECHILD) => {}
            Err(err) => warn!("Failed to reap PID {}: {err}", self.pid),
        }
        self.reaped = true;
    }

    fn record(&mut self, outcome: ExitOutcome) {
        self.exit = Some(outcome);
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.reaped {
            // Reap without blocking if the child has already gone.
            let _ = waitpid(self.pid, Some(WaitPidFlag::WNOHANG));
        }
    }
}

/// Sends `SIGKILL` to `pid`, treating an already-missing process as success.
pub fn kill_pid(pid: u32) -> Result<(), LivenessError> {
    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(source) => Err(LivenessError { pid, source }),
    }
}

/// Blocks until the child changes state, without reaping it.
#[cfg(target_os = "linux")]
fn wait_for_change(handle: &mut ProcessHandle) -> nix::Result<WaitStatus> {
    use nix::sys::wait::{Id, waitid};

    loop {
        match waitid(
            Id::Pid(handle.pid),
            WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT,
        ) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Blocks until the child changes state. `waitpid` reaps as it reports the exit.
#[cfg(not(target_os = "linux"))]
fn wait_for_change(handle: &mut ProcessHandle) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(handle.pid, None) {
            Err(Errno::EINTR) => continue,
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                handle.reaped = true;
                return Ok(status);
            }
            other => return other,
        }
    }
}

/// Reports whether the process behind `handle` is still running.
///
/// * The PID is first resolved against the process table; if it is gone the process
///   is dead and no error is reported.
/// * Otherwise this blocks until the OS reports a state change. An exit or a fatal
///   signal means dead; any other status means alive.
/// * Once dead has been observed, every further call returns `Ok(false)` immediately.
///
/// OS failures are returned as [`LivenessError`] so callers can tell "confirmed dead"
/// apart from "could not tell".
pub fn is_alive(handle: &mut ProcessHandle) -> Result<bool, LivenessError> {
    if handle.exit.is_some() {
        return Ok(false);
    }

    let pid = handle.pid();
    match signal::kill(handle.pid, None) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            debug!("PID {pid} not found in the process table");
            handle.record(ExitOutcome::Vanished);
            handle.reaped = true;
            return Ok(false);
        }
        Err(source) => return Err(LivenessError { pid, source }),
    }

    match wait_for_change(handle) {
        Ok(WaitStatus::Exited(_, code)) => {
            handle.record(ExitOutcome::Exited(code));
            Ok(false)
        }
        Ok(WaitStatus::Signaled(_, sig, _)) => {
            handle.record(ExitOutcome::Signaled(sig));
            Ok(false)
        }
        Ok(status) => {
            debug!("PID {pid} reported {status:?}; still alive");
            Ok(true)
        }
        Err(Errno::ECHILD) => {
            // Someone else collected the status; the child is certainly gone.
            handle.record(ExitOutcome::Vanished);
            handle.reaped = true;
            Ok(false)
        }
        Err(source) => Err(LivenessError { pid, source }),
    }
}
