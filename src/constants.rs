//! Shared constants for the warden supervisor.
use std::time::Duration;

// ============================================================================
// File System Constants
// ============================================================================

/// Name of the configuration file expected next to the warden executable.
pub const CONFIG_FILE_NAME: &str = "warden.yaml";

/// Executable launched when the configuration does not name one.
pub const DEFAULT_CHILD_EXECUTABLE: &str = "hysteria";

/// Subcommand passed to the installed service so it runs the supervisor entry point.
pub const RUN_SUBCOMMAND: &str = "run";

// ============================================================================
// Service Registration Defaults
// ============================================================================

/// Service name used when the configuration omits one.
pub const DEFAULT_SERVICE_NAME: &str = "warden";

/// Human readable service name used when the configuration omits one.
pub const DEFAULT_DISPLAY_NAME: &str = "Warden Supervisor";

/// Service description used when the configuration omits one.
pub const DEFAULT_DESCRIPTION: &str = "Keeps a single child executable alive.";

/// Directory holding systemd unit files on Linux.
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Directory holding launchd daemon definitions on macOS.
pub const LAUNCHD_DAEMON_DIR: &str = "/Library/LaunchDaemons";

// ============================================================================
// Supervision Timing
// ============================================================================

/// Delay before every liveness check, and between relaunch attempts after a
/// failed launch.
pub const CHECK_DELAY: Duration = Duration::from_secs(4);

/// Additional delay after a check has confirmed the child is alive.
pub const HEALTHY_DELAY: Duration = Duration::from_secs(14);

// ============================================================================
// Output Pumping
// ============================================================================

/// Maximum number of bytes forwarded as a single log record.
pub const PUMP_CHUNK_SIZE: usize = 1024;

/// Number of consecutive read failures after which a pump gives up on its stream.
pub const PUMP_MAX_CONSECUTIVE_ERRORS: u32 = 64;

/// How long a pump waits for readable data before rechecking its generation.
pub const PUMP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on chunks forwarded after cancellation, so a writer that never
/// stops cannot keep a retired pump alive.
pub const PUMP_DRAIN_MAX_CHUNKS: usize = 1024;

/// Tracing target used for records forwarded from the child's output.
pub const CHILD_LOG_TARGET: &str = "warden::child";

/// Default tracing filter when neither CLI, environment, nor config set one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
