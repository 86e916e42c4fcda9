#[path = "common/mod.rs"]
mod common;

use std::{io::ErrorKind, path::Path, sync::Arc};

use common::is_process_alive;
use nix::sys::signal::Signal;
use tempfile::tempdir;
use warden::{
    launcher::{StdioMode, launch},
    liveness::{ExitOutcome, is_alive},
    logs::{MemorySink, StreamKind},
    pump::{GenerationToken, PumpExit, spawn_pump},
    test_utils::{launch_script, write_script},
};

#[test]
fn launched_child_output_reaches_sink_until_exit() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(dir, "greet.sh", "echo ready\necho oops 1>&2\nexit 0");

    let launched = launch_script(dir, &script, StdioMode::Capture).expect("launch");
    let mut handle = launched.handle;
    let sink = Arc::new(MemorySink::new());
    let token = GenerationToken::new(1);

    let stdout = spawn_pump(
        launched.stdout.expect("stdout pipe"),
        StreamKind::Stdout,
        sink.clone(),
        token.clone(),
    )
    .unwrap();
    let stderr = spawn_pump(
        launched.stderr.expect("stderr pipe"),
        StreamKind::Stderr,
        sink.clone(),
        token,
    )
    .unwrap();

    assert!(!is_alive(&mut handle).unwrap());
    assert_eq!(handle.exit(), Some(ExitOutcome::Exited(0)));

    // Pipes close with the child, so both pumps drain and finish on their own.
    assert_eq!(stdout.join().unwrap(), PumpExit::EndOfStream);
    assert_eq!(stderr.join().unwrap(), PumpExit::EndOfStream);
    assert_eq!(sink.text(StreamKind::Stdout), "ready\n");
    assert_eq!(sink.text(StreamKind::Stderr), "oops\n");

    handle.reap();
}

#[test]
fn discarded_output_has_no_pipes() {
    let temp = tempdir().expect("failed to create tempdir");
    let launched = launch(temp.path(), Path::new("/bin/sh"), StdioMode::Discard).expect("launch");
    assert!(launched.stdout.is_none());
    assert!(launched.stderr.is_none());

    let mut handle = launched.handle;
    assert!(!is_alive(&mut handle).unwrap());
}

#[test]
fn killed_child_is_reported_dead_by_signal() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(dir, "idle.sh", "exec sleep 30");

    let mut handle = launch_script(dir, &script, StdioMode::Discard)
        .expect("launch")
        .handle;
    let pid = handle.pid();
    assert!(is_process_alive(pid));

    handle.kill().unwrap();
    assert!(!is_alive(&mut handle).unwrap());
    assert_eq!(handle.exit(), Some(ExitOutcome::Signaled(Signal::SIGKILL)));

    handle.reap();
    assert!(!is_process_alive(pid));
    // Dead stays dead, even after the PID has been released.
    assert!(!is_alive(&mut handle).unwrap());
}

#[test]
fn missing_executable_is_a_launch_error() {
    let temp = tempdir().expect("failed to create tempdir");
    let missing = temp.path().join("hysteria");

    let err = launch(temp.path(), &missing, StdioMode::Capture)
        .err()
        .expect("launch should fail");
    assert_eq!(err.executable, missing);
    assert_eq!(err.source.kind(), ErrorKind::NotFound);
}
