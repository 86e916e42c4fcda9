#![allow(dead_code)]

use std::{
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use warden::{
    launcher::StdioMode,
    logs::LogSink,
    supervisor::{Cadence, ChildSpec, Supervisor},
};

/// Check cadence short enough for tests to observe several cycles.
pub fn fast_cadence() -> Cadence {
    Cadence {
        check_delay: Duration::from_millis(50),
        healthy_delay: Duration::from_millis(100),
    }
}

pub fn supervisor_for(dir: &Path, executable: &Path, sink: Arc<dyn LogSink>) -> Supervisor {
    Supervisor::new(
        ChildSpec {
            working_dir: dir.to_path_buf(),
            executable: executable.to_path_buf(),
            stdio: StdioMode::Capture,
        },
        fast_cadence(),
        sink,
    )
}

/// Starts `sup`, retrying while a freshly written script is still busy.
pub fn start_eventually(sup: &Supervisor) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match sup.start() {
            Ok(()) => return,
            Err(err) if Instant::now() >= deadline => panic!("start failed: {err}"),
            Err(_) => thread::sleep(Duration::from_millis(25)),
        }
    }
}

pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if cond() {
            return;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {what}");
        }

        thread::sleep(Duration::from_millis(20));
    }
}

/// Whether `pid` refers to a live, non-zombie process.
pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}
