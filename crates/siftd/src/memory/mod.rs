//! Memory accounting for the execution unit.
//!
//! Counters follow the cgroup v2 layout configured in [`MemorySettings`]:
//! a ceiling, the current usage, and a `key value` breakdown. The ceiling is
//! read once when a [`MemoryProbe`] is set up; an unlimited or unreadable
//! ceiling disables tracking for the run. Raw usage includes reclaimable page
//! cache, so once it reaches the force-exit fraction it is refined by
//! subtracting `inactive_file` before a verdict is reached.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use sift_config::MemorySettings;

pub(crate) const MEMORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::memory");

/// Ceiling value meaning "no limit".
const UNLIMITED: &str = "max";

/// Breakdown entry counting reclaimable page cache.
const INACTIVE_FILE: &str = "inactive_file";

/// Errors raised while reading memory counters.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    /// A counter file could not be read.
    #[error("failed to read memory counter '{}': {source}", path.display())]
    Read {
        /// Counter file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A counter file did not hold a byte count.
    #[error("memory counter '{}' holds '{value}', expected a byte count", path.display())]
    Parse {
        /// Counter file.
        path: PathBuf,
        /// Offending content.
        value: String,
    },
}

/// One usage reading against the ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    /// Usage in bytes, refined when near the ceiling.
    pub usage: u64,
    /// Ceiling in bytes.
    pub limit: u64,
}

impl MemorySample {
    /// Usage as a percentage of the ceiling.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.limit == 0 {
            return 100.0;
        }
        self.usage as f64 / self.limit as f64 * 100.0
    }
}

impl fmt::Display for MemorySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B of {}B ({:.1}%)", self.usage, self.limit, self.percent())
    }
}

/// Classification of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoryVerdict {
    /// Below the warning fraction.
    Healthy(MemorySample),
    /// At or above the warning fraction.
    Warning(MemorySample),
    /// At or above the force-exit fraction after refinement.
    OutOfMemory(MemorySample),
}

impl MemoryVerdict {
    /// The underlying sample.
    #[must_use]
    pub const fn sample(&self) -> MemorySample {
        match self {
            Self::Healthy(sample) | Self::Warning(sample) | Self::OutOfMemory(sample) => *sample,
        }
    }
}

/// Reads counters and classifies usage against a fixed ceiling.
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    limit: u64,
    current_path: PathBuf,
    summary_path: PathBuf,
    warning_frac: f64,
    force_exit_frac: f64,
}

impl MemoryProbe {
    /// Reads the ceiling and returns a probe, or `None` when tracking is
    /// disabled for this run.
    #[must_use]
    pub fn setup(settings: &MemorySettings) -> Option<Self> {
        if !settings.enable_mem_limits {
            debug!(target: MEMORY_TARGET, "memory tracking disabled by settings");
            return None;
        }
        let path = settings.max_mem_file_path.as_path();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    target: MEMORY_TARGET,
                    path = %path.display(),
                    %error,
                    "memory ceiling unreadable, tracking disabled"
                );
                return None;
            }
        };
        let raw = raw.trim();
        if raw == UNLIMITED {
            info!(
                target: MEMORY_TARGET,
                path = %path.display(),
                "memory ceiling is unlimited, tracking disabled"
            );
            return None;
        }
        let Ok(limit) = raw.parse::<u64>() else {
            warn!(
                target: MEMORY_TARGET,
                path = %path.display(),
                value = raw,
                "memory ceiling malformed, tracking disabled"
            );
            return None;
        };
        debug!(target: MEMORY_TARGET, limit, "memory tracking enabled");
        Some(Self {
            limit,
            current_path: settings.cur_mem_file_path.clone(),
            summary_path: settings.cur_mem_summary_file_path.clone(),
            warning_frac: settings.used_mem_warning_frac,
            force_exit_frac: settings.used_mem_force_exit_frac,
        })
    }

    /// Ceiling in bytes.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Samples usage and classifies it.
    ///
    /// # Errors
    ///
    /// [`MemoryError`] when a counter cannot be read or parsed.
    pub fn sample(&self) -> Result<MemoryVerdict, MemoryError> {
        let mut usage = read_counter(&self.current_path)?;
        let force_exit_at = self.limit as f64 * self.force_exit_frac;
        if usage as f64 >= force_exit_at {
            let inactive = read_breakdown_entry(&self.summary_path, INACTIVE_FILE)?;
            usage = usage.saturating_sub(inactive);
        }
        let sample = MemorySample {
            usage,
            limit: self.limit,
        };
        if usage as f64 >= force_exit_at {
            Ok(MemoryVerdict::OutOfMemory(sample))
        } else if usage as f64 >= self.limit as f64 * self.warning_frac {
            Ok(MemoryVerdict::Warning(sample))
        } else {
            Ok(MemoryVerdict::Healthy(sample))
        }
    }
}

fn read_file(path: &Path) -> Result<String, MemoryError> {
    fs::read_to_string(path).map_err(|source| MemoryError::Read {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })
}

fn read_counter(path: &Path) -> Result<u64, MemoryError> {
    let raw = read_file(path)?;
    raw.trim().parse().map_err(|_| MemoryError::Parse {
        path: path.to_path_buf(),
        value: raw.trim().to_owned(),
    })
}

/// Value of `key` in a `key value` breakdown; absent keys count as zero.
fn read_breakdown_entry(path: &Path, key: &str) -> Result<u64, MemoryError> {
    let raw = read_file(path)?;
    let Some(value) = raw.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        (fields.next() == Some(key)).then(|| fields.next()).flatten()
    }) else {
        return Ok(0);
    };
    value.parse().map_err(|_| MemoryError::Parse {
        path: path.to_path_buf(),
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests;
