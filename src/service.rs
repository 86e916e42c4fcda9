//! The service instance handed to the host OS service manager.
use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc::Receiver},
};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::WardenError;
use crate::launcher::StdioMode;
use crate::logs::LogSink;
use crate::supervisor::{Cadence, ChildSpec, Supervisor, SupervisorState};

/// One running instance of the warden service: its root, configuration, and the
/// supervisor that owns the child.
pub struct Warden {
    root: PathBuf,
    config: Config,
    supervisor: Supervisor,
}

impl Warden {
    /// Builds the service with the production check cadence.
    pub fn new(root: PathBuf, config: Config, sink: Arc<dyn LogSink>) -> Self {
        Self::with_cadence(root, config, sink, Cadence::default())
    }

    pub fn with_cadence(
        root: PathBuf,
        config: Config,
        sink: Arc<dyn LogSink>,
        cadence: Cadence,
    ) -> Self {
        let spec = ChildSpec {
            working_dir: root.clone(),
            executable: config.child.executable_path(&root),
            stdio: StdioMode::from_capture(config.child.capture_output),
        };

        Self {
            supervisor: Supervisor::new(spec, cadence, sink),
            root,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Service start entry point. Launches the child and returns without blocking.
    pub fn start(&self) -> Result<(), WardenError> {
        info!("Service '{}' starting in {}", self.config.service.name, self.root.display());
        self.supervisor.start()
    }

    /// Service stop entry point. Kills the child and returns without waiting.
    pub fn stop(&self) -> Result<(), WardenError> {
        info!("Service '{}' stopping", self.config.service.name);
        self.supervisor.stop()
    }

    /// Starts the service, blocks until `shutdown` fires, then stops it and waits for
    /// the supervision thread to wind down.
    pub fn run(&self, shutdown: Receiver<()>) -> Result<(), WardenError> {
        self.start()?;

        if shutdown.recv().is_err() {
            warn!("Shutdown channel closed; stopping");
        }

        let stopped = self.stop();
        self.supervisor.join();
        info!("Service '{}' stopped", self.config.service.name);
        stopped
    }

    pub fn state(&self) -> SupervisorState {
        self.supervisor.state()
    }
}
