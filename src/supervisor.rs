//! The supervision loop: launch, watch, relaunch on death.
use std::{
    path::PathBuf,
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use strum::Display;
use tracing::{debug, error, info, warn};

use crate::constants::{CHECK_DELAY, HEALTHY_DELAY};
use crate::error::{LaunchError, LivenessError, WardenError};
use crate::launcher::{self, StdioMode};
use crate::liveness::{self, ProcessHandle, kill_pid};
use crate::logs::{LogSink, StreamKind};
use crate::pump::{GenerationToken, PumpExit, PumpSource, spawn_pump};

/// Lifecycle of the supervised child as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SupervisorState {
    /// Not supervising. Initial and terminal state.
    Stopped,
    /// A launch is in flight.
    Starting,
    /// A child is believed to be running.
    Running,
    /// The last child died; a relaunch is pending or being retried.
    Dead,
}

/// Fixed timing of the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Wait before each liveness check and between failed relaunches.
    pub check_delay: Duration,
    /// Extra wait after a check found the child alive.
    pub healthy_delay: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            check_delay: CHECK_DELAY,
            healthy_delay: HEALTHY_DELAY,
        }
    }
}

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub working_dir: PathBuf,
    pub executable: PathBuf,
    pub stdio: StdioMode,
}

/// State shared between the control API and the supervision thread.
///
/// `pid` is the only view other threads get of the tracked process. It is withdrawn
/// under this lock before the supervision thread reaps the child, so a kill issued
/// while holding the lock can never hit a recycled PID.
#[derive(Debug)]
struct Control {
    enabled: bool,
    state: SupervisorState,
    pid: Option<u32>,
    generation: Option<GenerationToken>,
    next_generation: u64,
}

struct Inner {
    spec: ChildSpec,
    cadence: Cadence,
    sink: Arc<dyn LogSink>,
    control: Mutex<Control>,
    wake: Condvar,
    launches: AtomicU64,
    /// Pump threads by generation. Finished ones are pruned on every launch.
    pumps: Mutex<Vec<(u64, thread::JoinHandle<PumpExit>)>>,
    /// Runs between spawning a child and publishing it.
    #[cfg(test)]
    spawn_hook: Mutex<Option<Box<dyn FnOnce(&Inner, u32) + Send>>>,
}

/// Keeps one child process alive.
///
/// The supervision thread exclusively owns the [`ProcessHandle`]. `start` and `stop`
/// return promptly; all waiting happens on the background thread.
pub struct Supervisor {
    inner: Arc<Inner>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(spec: ChildSpec, cadence: Cadence, sink: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                spec,
                cadence,
                sink,
                control: Mutex::new(Control {
                    enabled: false,
                    state: SupervisorState::Stopped,
                    pid: None,
                    generation: None,
                    next_generation: 1,
                }),
                wake: Condvar::new(),
                launches: AtomicU64::new(0),
                pumps: Mutex::new(Vec::new()),
                #[cfg(test)]
                spawn_hook: Mutex::new(None),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Launches the child and spawns the supervision thread.
    ///
    /// A launch failure is returned and leaves the supervisor stopped. Calling this
    /// while already supervising is a no-op.
    pub fn start(&self) -> Result<(), WardenError> {
        let state = self.state();
        if state != SupervisorState::Stopped {
            warn!("Supervisor already active ({state}); ignoring start");
            return Ok(());
        }

        // A previous run may still be collecting its killed child.
        self.join();

        {
            let mut control = self.inner.control.lock()?;
            if control.state != SupervisorState::Stopped {
                warn!("Supervisor already active ({}); ignoring start", control.state);
                return Ok(());
            }
            control.enabled = true;
            control.state = SupervisorState::Starting;
        }

        info!("Starting {}", self.inner.spec.executable.display());

        let handle = match self.inner.launch() {
            Ok(Some(handle)) => handle,
            Ok(None) => return Ok(()),
            Err(err) => {
                let mut control = self.inner.control.lock()?;
                control.enabled = false;
                control.state = SupervisorState::Stopped;
                return Err(err.into());
            }
        };

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("warden-supervisor".into())
            .spawn(move || inner.supervise(handle));

        match spawned {
            Ok(join) => {
                *self.thread.lock()? = Some(join);
                Ok(())
            }
            Err(source) => {
                error!("Failed to spawn supervision thread: {source}");
                self.stop()?;
                Err(WardenError::Thread(source))
            }
        }
    }

    /// Kills the tracked child and disables any further relaunch.
    ///
    /// Sends `SIGKILL` without waiting for the child to exit.
    pub fn stop(&self) -> Result<(), WardenError> {
        self.inner.shutdown().map_err(WardenError::from)
    }

    /// Waits for the supervision thread to finish. Only returns after `stop`.
    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Supervision thread panicked");
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.control().state
    }

    /// PID of the tracked child, if one is believed to be running.
    pub fn pid(&self) -> Option<u32> {
        self.inner.control().pid
    }

    /// Sequence number of the current process generation.
    pub fn generation(&self) -> Option<u64> {
        self.inner
            .control()
            .generation
            .as_ref()
            .map(GenerationToken::generation)
    }

    /// Number of launch attempts made so far, successful or not.
    pub fn launches(&self) -> u64 {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Generations that still have a pump thread running, one entry per pump.
    pub fn live_pump_generations(&self) -> Vec<u64> {
        self.inner
            .pumps()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(generation, _)| *generation)
            .collect()
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pumps(&self) -> MutexGuard<'_, Vec<(u64, thread::JoinHandle<PumpExit>)>> {
        self.pumps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Disables supervision, cancels the current generation and kills its child.
    ///
    /// The kill happens under the control lock, so it can only reach the PID the
    /// supervision thread has not yet withdrawn.
    fn shutdown(&self) -> Result<(), LivenessError> {
        let killed = {
            let mut control = self.control();
            control.enabled = false;
            control.state = SupervisorState::Stopped;
            if let Some(token) = control.generation.take() {
                token.cancel();
            }
            match control.pid.take() {
                Some(pid) => {
                    info!("Stopping child PID {pid}");
                    kill_pid(pid)
                }
                None => {
                    debug!("Stop requested with no tracked child");
                    Ok(())
                }
            }
        };
        self.wake.notify_all();
        killed
    }

    #[cfg(test)]
    fn run_spawn_hook(&self, pid: u32) {
        let hook = self.spawn_hook.lock().ok().and_then(|mut hook| hook.take());
        if let Some(hook) = hook {
            hook(self, pid);
        }
    }

    #[cfg(not(test))]
    fn run_spawn_hook(&self, _pid: u32) {}

    /// Sleeps for `duration` unless supervision is disabled first.
    /// Returns whether supervision is still enabled.
    fn pause(&self, duration: Duration) -> bool {
        let control = self.control();
        let (control, _) = self
            .wake
            .wait_timeout_while(control, duration, |c| c.enabled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        control.enabled
    }

    /// Starts a new generation. Returns `Ok(None)` if supervision was disabled
    /// before or during the launch; a child spawned in that window is killed.
    fn launch(&self) -> Result<Option<ProcessHandle>, LaunchError> {
        {
            let mut control = self.control();
            if !control.enabled {
                return Ok(None);
            }
            control.state = SupervisorState::Starting;
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        let spec = &self.spec;
        let launched = launcher::launch(&spec.working_dir, &spec.executable, spec.stdio)?;
        let mut handle = launched.handle;

        self.run_spawn_hook(handle.pid());

        let token = {
            let mut control = self.control();
            if !control.enabled {
                drop(control);
                warn!(
                    "Stop requested while launching; killing PID {}",
                    handle.pid()
                );
                if let Err(err) = handle.kill() {
                    error!("{err}");
                }
                if liveness::is_alive(&mut handle).is_ok() {
                    handle.reap();
                }
                return Ok(None);
            }

            let token = GenerationToken::new(control.next_generation);
            control.next_generation += 1;
            // Retire the previous generation's pumps; they forward their backlog first.
            if let Some(previous) = control.generation.replace(token.clone()) {
                previous.cancel();
            }
            control.pid = Some(handle.pid());
            control.state = SupervisorState::Running;
            token
        };

        info!(
            "Child {} running with PID {} (generation {})",
            spec.executable.display(),
            handle.pid(),
            token.generation()
        );

        if let Some(stdout) = launched.stdout {
            self.attach_pump(stdout, StreamKind::Stdout, &token);
        }
        if let Some(stderr) = launched.stderr {
            self.attach_pump(stderr, StreamKind::Stderr, &token);
        }

        Ok(Some(handle))
    }

    fn attach_pump<R>(&self, reader: R, stream: StreamKind, token: &GenerationToken)
    where
        R: PumpSource + Send + 'static,
    {
        match spawn_pump(reader, stream, Arc::clone(&self.sink), token.clone()) {
            Ok(handle) => {
                let mut pumps = self.pumps();
                pumps.retain(|(_, pump)| !pump.is_finished());
                pumps.push((token.generation(), handle));
            }
            Err(err) => error!("Failed to spawn {stream} pump: {err}"),
        }
    }

    /// Withdraws the dead child's PID. Its pumps keep running until they reach the
    /// end of their streams or the next generation replaces them.
    /// Returns whether supervision is still enabled.
    fn retire(&self) -> bool {
        let mut control = self.control();
        control.pid = None;
        if control.enabled {
            control.state = SupervisorState::Dead;
        }
        control.enabled
    }

    /// Body of the supervision thread.
    fn supervise(self: Arc<Self>, mut handle: ProcessHandle) {
        debug!("Supervision thread started for PID {}", handle.pid());

        'supervise: loop {
            if !self.pause(self.cadence.check_delay) {
                break;
            }

            match liveness::is_alive(&mut handle) {
                Ok(true) => {
                    info!("Child PID {} is alive", handle.pid());
                    if !self.pause(self.cadence.healthy_delay) {
                        break;
                    }
                    continue;
                }
                Ok(false) => {
                    warn!(
                        "Child PID {} is not running ({:?})",
                        handle.pid(),
                        handle.exit()
                    );
                }
                Err(err) => {
                    error!("{err}; treating child as dead");
                }
            }

            let enabled = self.retire();
            handle.reap();
            if !enabled {
                break;
            }

            loop {
                match self.launch() {
                    Ok(Some(next)) => {
                        handle = next;
                        break;
                    }
                    Ok(None) => break 'supervise,
                    Err(err) => {
                        error!(
                            "Relaunch failed: {err}; retrying in {:?}",
                            self.cadence.check_delay
                        );
                        self.control().state = SupervisorState::Dead;
                        if !self.pause(self.cadence.check_delay) {
                            break 'supervise;
                        }
                    }
                }
            }
        }

        // Stop already sent SIGKILL; collect the exit so no zombie is left behind.
        if handle.exit().is_none() && liveness::is_alive(&mut handle).is_err() {
            warn!("Could not confirm exit of PID {}", handle.pid());
        }
        handle.reap();

        let pumps: Vec<_> = self.pumps().drain(..).collect();
        for (generation, pump) in pumps {
            if pump.join().is_err() {
                error!("Pump thread for generation {generation} panicked");
            }
        }
        info!("Supervision stopped");
    }
}
