#[path = "common/mod.rs"]
mod common;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use common::{is_process_alive, start_eventually, supervisor_for, wait_until};
use tempfile::tempdir;
use tracing::Level;
use warden::{
    logs::{LogSink, MemorySink, StreamKind},
    supervisor::SupervisorState,
    test_utils::write_script,
};

/// Records into a `MemorySink`, slowly enough that a pump falls behind its child.
struct SlowSink {
    inner: MemorySink,
}

impl LogSink for SlowSink {
    fn record(&self, level: Level, stream: StreamKind, message: &str) {
        thread::sleep(Duration::from_millis(5));
        self.inner.record(level, stream, message);
    }
}

/// A script that runs `first` on its first launch and `exec sleep 30` afterwards.
fn first_run_script(dir: &Path, name: &str, first: &str) -> PathBuf {
    let marker = dir.join(format!("{name}.ran"));
    write_script(
        dir,
        name,
        &format!(
            "if [ -f '{marker}' ]; then exec sleep 30; fi\ntouch '{marker}'\n{first}",
            marker = marker.display()
        ),
    )
}

#[test]
fn output_of_a_dead_child_is_forwarded_in_full() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = first_run_script(
        dir,
        "crashy.sh",
        "head -c 40960 /dev/zero | tr '\\000' 'e' 1>&2\nexit 1",
    );

    let sink = Arc::new(SlowSink {
        inner: MemorySink::new(),
    });
    let sup = supervisor_for(dir, &script, sink.clone());
    start_eventually(&sup);

    wait_until("relaunch", || sup.generation() == Some(2));
    wait_until("full stderr backlog", || {
        sink.inner.text(StreamKind::Stderr).len() >= 40960
    });
    assert_eq!(sink.inner.text(StreamKind::Stderr), "e".repeat(40960));

    sup.stop().unwrap();
    sup.join();
}

#[test]
fn replaced_generation_pumps_exit_even_if_pipes_stay_open() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    // The background sleep inherits the pipes and keeps them open past the relaunch.
    let script = first_run_script(dir, "forking.sh", "sleep 5 &\nexit 0");

    let sup = supervisor_for(dir, &script, Arc::new(MemorySink::new()));
    start_eventually(&sup);

    wait_until("relaunch", || sup.generation() == Some(2));
    wait_until("first generation pumps to exit", || {
        !sup.live_pump_generations().contains(&1)
    });
    assert!(sup.live_pump_generations().contains(&2));

    sup.stop().unwrap();
    sup.join();
    assert!(sup.live_pump_generations().is_empty());
}

#[test]
fn child_that_exits_immediately_is_relaunched_once() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let marker = dir.join("first_run_done");
    let script = write_script(
        dir,
        "flaky.sh",
        &format!(
            "if [ -f '{marker}' ]; then exec sleep 30; fi\ntouch '{marker}'\nexit 1",
            marker = marker.display()
        ),
    );

    let sup = supervisor_for(dir, &script, Arc::new(MemorySink::new()));
    start_eventually(&sup);
    let initial = sup.launches();

    wait_until("second generation", || {
        sup.generation() == Some(2) && sup.state() == SupervisorState::Running
    });
    assert!(marker.exists());

    // The replacement runs indefinitely; several check cycles must pass quietly.
    thread::sleep(Duration::from_millis(500));
    assert_eq!(sup.launches(), initial + 1);
    assert_eq!(sup.generation(), Some(2));

    sup.stop().unwrap();
    sup.join();
}

#[test]
fn stop_kills_child_and_prevents_relaunch() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(dir, "forever.sh", "exec sleep 30");

    let sup = supervisor_for(dir, &script, Arc::new(MemorySink::new()));
    start_eventually(&sup);
    let pid = sup.pid().expect("child pid");
    let launches = sup.launches();
    assert!(is_process_alive(pid));

    sup.stop().unwrap();
    assert_eq!(sup.state(), SupervisorState::Stopped);
    assert_eq!(sup.pid(), None);
    sup.join();

    assert!(!is_process_alive(pid), "child {pid} survived stop");
    thread::sleep(Duration::from_millis(300));
    assert_eq!(sup.launches(), launches);
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

#[test]
fn missing_child_is_retried_until_it_reappears() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(dir, "vanishing.sh", "rm -f \"$0\"\nexit 0");

    let sup = supervisor_for(dir, &script, Arc::new(MemorySink::new()));
    start_eventually(&sup);
    let initial = sup.launches();

    // Each retry fails to launch; the loop keeps going instead of giving up.
    wait_until("repeated relaunch attempts", || sup.launches() >= initial + 3);
    assert_ne!(sup.state(), SupervisorState::Running);
    assert_eq!(sup.pid(), None);

    write_script(dir, "vanishing.sh", "exec sleep 30");
    wait_until("recovered child", || sup.state() == SupervisorState::Running);
    let pid = sup.pid().expect("recovered pid");
    assert!(is_process_alive(pid));
    assert_eq!(sup.generation(), Some(2));

    sup.stop().unwrap();
    sup.join();
    assert!(!is_process_alive(pid));
}

#[test]
fn child_output_is_forwarded_by_stream() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(
        dir,
        "chatty.sh",
        "echo to-stdout\necho to-stderr 1>&2\nexec sleep 30",
    );

    let sink = Arc::new(MemorySink::new());
    let sup = supervisor_for(dir, &script, sink.clone());
    start_eventually(&sup);

    wait_until("both streams", || {
        sink.text(StreamKind::Stdout).contains("to-stdout")
            && sink.text(StreamKind::Stderr).contains("to-stderr")
    });

    let records = sink.records();
    assert!(
        records
            .iter()
            .filter(|r| r.stream == StreamKind::Stdout)
            .all(|r| r.level == Level::INFO)
    );
    assert!(
        records
            .iter()
            .filter(|r| r.stream == StreamKind::Stderr)
            .all(|r| r.level == Level::ERROR)
    );
    assert!(!sink.text(StreamKind::Stdout).contains("to-stderr"));

    sup.stop().unwrap();
    sup.join();
}

#[test]
fn restart_after_stop_begins_a_new_generation() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(dir, "forever.sh", "exec sleep 30");

    let sup = supervisor_for(dir, &script, Arc::new(MemorySink::new()));
    start_eventually(&sup);
    let first = sup.pid().expect("first pid");
    assert_eq!(sup.generation(), Some(1));

    sup.stop().unwrap();
    sup.join();
    assert_eq!(sup.generation(), None);

    start_eventually(&sup);
    let second = sup.pid().expect("second pid");
    assert_ne!(first, second);
    assert_eq!(sup.generation(), Some(2));
    assert_eq!(sup.state(), SupervisorState::Running);

    sup.stop().unwrap();
    sup.join();
    assert!(!is_process_alive(second));
}

#[test]
fn start_while_running_is_ignored() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let script = write_script(dir, "forever.sh", "exec sleep 30");

    let sup = supervisor_for(dir, &script, Arc::new(MemorySink::new()));
    start_eventually(&sup);
    let pid = sup.pid();
    let launches = sup.launches();

    sup.start().unwrap();
    assert_eq!(sup.pid(), pid);
    assert_eq!(sup.launches(), launches);

    sup.stop().unwrap();
    sup.join();
    assert_eq!(sup.state(), SupervisorState::Stopped);
}
