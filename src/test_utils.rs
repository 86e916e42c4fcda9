use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
    thread,
    time::Duration,
};

use crate::error::LaunchError;
use crate::launcher::{LaunchedProcess, StdioMode, launch};

/// Global lock for environment variable modifications in tests.
/// All tests that modify environment variables should acquire this lock
/// to prevent race conditions between parallel test executions.
pub static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks `path` as executable by its owner.
pub fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod script");
}

/// Writes a `/bin/sh` script named `name` into `dir` and makes it executable.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    make_executable(&path);
    path
}

/// Launches a freshly written script, retrying while another test thread's fork
/// still holds the script's write descriptor (`ETXTBSY`).
pub fn launch_script(
    dir: &Path,
    script: &Path,
    stdio: StdioMode,
) -> Result<LaunchedProcess, LaunchError> {
    let mut attempts = 0;
    loop {
        match launch(dir, script, stdio) {
            Err(err)
                if err.source.raw_os_error() == Some(nix::libc::ETXTBSY)
                    && attempts < 20 =>
            {
                attempts += 1;
                thread::sleep(Duration::from_millis(25));
            }
            other => return other,
        }
    }
}
