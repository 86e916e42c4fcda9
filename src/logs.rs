//! Logger sink and subscriber setup.
//!
//! Everything the supervisor reports goes through `tracing`. Output forwarded from the
//! child is routed through the [`LogSink`] seam so pumps can be exercised against an
//! in-memory sink in tests.
use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::Mutex,
};

use strum::{AsRefStr, Display};
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::constants::{CHILD_LOG_TARGET, DEFAULT_LOG_LEVEL};
use crate::error::WardenError;

/// Which of the child's output streams a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Level at which chunks from this stream are recorded.
    pub fn level(&self) -> Level {
        match self {
            StreamKind::Stdout => Level::INFO,
            StreamKind::Stderr => Level::ERROR,
        }
    }

    /// Static name, used in error values.
    pub fn as_static_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Destination for leveled lines forwarded from the child.
pub trait LogSink: Send + Sync {
    /// Records one message.
    fn record(&self, level: Level, stream: StreamKind, message: &str);
}

/// Production sink: emits each record as a `tracing` event under the child target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, level: Level, stream: StreamKind, message: &str) {
        let stream = stream.as_ref();
        match level {
            Level::ERROR => error!(target: CHILD_LOG_TARGET, stream, "{message}"),
            Level::WARN => warn!(target: CHILD_LOG_TARGET, stream, "{message}"),
            Level::INFO => info!(target: CHILD_LOG_TARGET, stream, "{message}"),
            Level::DEBUG => debug!(target: CHILD_LOG_TARGET, stream, "{message}"),
            _ => trace!(target: CHILD_LOG_TARGET, stream, "{message}"),
        }
    }
}

/// A single captured record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub stream: StreamKind,
    pub message: String,
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in arrival order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Concatenated messages recorded for one stream.
    pub fn text(&self, stream: StreamKind) -> String {
        self.records()
            .into_iter()
            .filter(|record| record.stream == stream)
            .map(|record| record.message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn record(&self, level: Level, stream: StreamKind, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(LogRecord {
                level,
                stream,
                message: message.to_string(),
            });
    }
}

/// Picks the filter directive: CLI override, then `RUST_LOG`, then config, then `info`.
fn build_filter(config: &LoggingConfig, override_level: Option<&str>) -> EnvFilter {
    if let Some(level) = override_level {
        return EnvFilter::new(level);
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(config.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))
}

/// Installs the global subscriber. Must be called once, before the supervisor starts.
pub fn init(
    config: &LoggingConfig,
    root: &Path,
    override_level: Option<&str>,
) -> Result<(), WardenError> {
    let filter = build_filter(config, override_level);

    let result = match config.file_path(root) {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| {
                    WardenError::Logging(format!("{}: {e}", dir.display()))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| WardenError::Logging(format!("{}: {e}", path.display())))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .try_init(),
    };

    result.map_err(|e| WardenError::Logging(e.to_string()))
}
