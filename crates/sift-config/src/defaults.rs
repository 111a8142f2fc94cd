//! Default values used when a setting is absent.

use std::env;
use std::path::PathBuf;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Attempts made for a dispatcher call beyond the first one.
pub const DEFAULT_REQUEST_RETRY_COUNT: u32 = 3;

/// Base pause between dispatcher retries; multiplied by the attempt number.
pub const DEFAULT_REQUEST_RETRY_DELAY_MS: u64 = 500;

/// Pause after any failed cycle before the next fetch.
pub const DEFAULT_DELAY_AFTER_EXCEPTION_MS: u64 = 5_000;

/// Pause when there is no work or the plugin is not ready.
pub const DEFAULT_IDLE_DELAY_MS: u64 = 1_000;

/// cgroup v2 file holding the memory ceiling.
pub const DEFAULT_MAX_MEM_FILE: &str = "/sys/fs/cgroup/memory.max";

/// cgroup v2 file holding the current memory usage.
pub const DEFAULT_CUR_MEM_FILE: &str = "/sys/fs/cgroup/memory.current";

/// cgroup v2 file holding the usage breakdown.
pub const DEFAULT_MEM_SUMMARY_FILE: &str = "/sys/fs/cgroup/memory.stat";

/// Interval between memory samples.
pub const DEFAULT_MEM_POLL_MS: u64 = 1_000;

/// Fraction of the ceiling at which a warning is logged.
pub const DEFAULT_WARNING_FRACTION: f64 = 0.8;

/// Fraction of the ceiling at which the execution unit is killed.
pub const DEFAULT_FORCE_EXIT_FRACTION: f64 = 0.9;

/// Directory receiving result artefacts when none is configured.
#[must_use]
pub fn default_result_dir() -> PathBuf {
    env::temp_dir()
}
