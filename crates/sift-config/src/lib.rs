//! Runtime settings shared by the sift supervisor and coordinator.
//!
//! [`Settings`] is a plain `serde` structure with a default for every field so
//! any loader can populate it from whatever source it owns. Parsing command
//! lines and locating settings files is left to the embedding binary; this
//! crate only describes the values and checks that they are coherent via
//! [`Settings::validate`].

mod defaults;
mod logging;
mod memory;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_DELAY_AFTER_EXCEPTION_MS, DEFAULT_IDLE_DELAY_MS, DEFAULT_LOG_FILTER,
    DEFAULT_REQUEST_RETRY_COUNT, DEFAULT_REQUEST_RETRY_DELAY_MS, default_result_dir,
};
pub use logging::{LogFormat, LogFormatParseError, LogSettings};
pub use memory::MemorySettings;

/// Settings for one worker process.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Retries for a transient dispatcher failure before the cycle is skipped.
    pub request_retry_count: u32,
    /// Base delay between dispatcher retries in milliseconds.
    pub request_retry_delay_ms: u64,
    /// Pause after a failed cycle in milliseconds.
    pub delay_after_exception_ms: u64,
    /// Pause when no job is available or the plugin is not ready.
    pub idle_delay_ms: u64,
    /// Directory for result artefacts exchanged with execution units.
    pub result_dir: PathBuf,
    /// Logging options.
    pub logging: LogSettings,
    /// Memory accounting options.
    pub memory: MemorySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_retry_count: DEFAULT_REQUEST_RETRY_COUNT,
            request_retry_delay_ms: DEFAULT_REQUEST_RETRY_DELAY_MS,
            delay_after_exception_ms: DEFAULT_DELAY_AFTER_EXCEPTION_MS,
            idle_delay_ms: DEFAULT_IDLE_DELAY_MS,
            result_dir: default_result_dir(),
            logging: LogSettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

impl Settings {
    /// Base delay between dispatcher retries.
    #[must_use]
    pub const fn request_retry_delay(&self) -> Duration {
        Duration::from_millis(self.request_retry_delay_ms)
    }

    /// Pause applied after a failed cycle.
    #[must_use]
    pub const fn delay_after_exception(&self) -> Duration {
        Duration::from_millis(self.delay_after_exception_ms)
    }

    /// Pause applied when there is nothing to do.
    #[must_use]
    pub const fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Directory receiving result artefacts.
    #[must_use]
    pub fn result_dir(&self) -> &Path {
        self.result_dir.as_path()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.logging.format
    }

    /// Checks that the memory thresholds and intervals are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a fraction lies outside `(0, 1]`, the
    /// warning fraction exceeds the force-exit fraction, or the poll interval
    /// is zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let memory = &self.memory;
        check_fraction("used_mem_warning_frac", memory.used_mem_warning_frac)?;
        check_fraction("used_mem_force_exit_frac", memory.used_mem_force_exit_frac)?;
        if memory.used_mem_warning_frac > memory.used_mem_force_exit_frac {
            return Err(SettingsError::InvertedThresholds {
                warning: memory.used_mem_warning_frac,
                force_exit: memory.used_mem_force_exit_frac,
            });
        }
        if memory.mem_poll_frequency_milliseconds == 0 {
            return Err(SettingsError::ZeroPollInterval);
        }
        Ok(())
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), SettingsError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(SettingsError::FractionOutOfRange { field, value })
    }
}

/// Incoherent settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// A memory fraction is not within `(0, 1]`.
    #[error("{field} must lie in (0, 1], got {value}")]
    FractionOutOfRange {
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
    /// The warning threshold is above the force-exit threshold.
    #[error("warning fraction {warning} exceeds force-exit fraction {force_exit}")]
    InvertedThresholds {
        /// Configured warning fraction.
        warning: f64,
        /// Configured force-exit fraction.
        force_exit: f64,
    },
    /// Memory would be sampled continuously.
    #[error("mem_poll_frequency_milliseconds must be greater than zero")]
    ZeroPollInterval,
}
