//! Memory accounting inputs for the execution unit supervisor.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_CUR_MEM_FILE, DEFAULT_FORCE_EXIT_FRACTION, DEFAULT_MAX_MEM_FILE,
    DEFAULT_MEM_POLL_MS, DEFAULT_MEM_SUMMARY_FILE, DEFAULT_WARNING_FRACTION,
};

/// Where memory counters are read from and how they are interpreted.
///
/// The three paths follow the cgroup v2 layout: a ceiling (`memory.max`), the
/// current usage (`memory.current`), and a `key value` breakdown
/// (`memory.stat`) whose `inactive_file` entry counts reclaimable page cache.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Master switch for memory tracking.
    pub enable_mem_limits: bool,
    /// File holding the memory ceiling in bytes.
    pub max_mem_file_path: PathBuf,
    /// File holding the current usage in bytes.
    pub cur_mem_file_path: PathBuf,
    /// File holding the usage breakdown.
    pub cur_mem_summary_file_path: PathBuf,
    /// Interval between samples in milliseconds.
    pub mem_poll_frequency_milliseconds: u64,
    /// Fraction of the ceiling that triggers a warning.
    pub used_mem_warning_frac: f64,
    /// Fraction of the ceiling that terminates the execution unit.
    pub used_mem_force_exit_frac: f64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enable_mem_limits: true,
            max_mem_file_path: PathBuf::from(DEFAULT_MAX_MEM_FILE),
            cur_mem_file_path: PathBuf::from(DEFAULT_CUR_MEM_FILE),
            cur_mem_summary_file_path: PathBuf::from(DEFAULT_MEM_SUMMARY_FILE),
            mem_poll_frequency_milliseconds: DEFAULT_MEM_POLL_MS,
            used_mem_warning_frac: DEFAULT_WARNING_FRACTION,
            used_mem_force_exit_frac: DEFAULT_FORCE_EXIT_FRACTION,
        }
    }
}

impl MemorySettings {
    /// Settings that never read any counter.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_mem_limits: false,
            ..Self::default()
        }
    }

    /// Interval between memory samples.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.mem_poll_frequency_milliseconds)
    }
}
