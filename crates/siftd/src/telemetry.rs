//! Process-wide log subscriber for a worker.
//!
//! A worker installs one global `tracing` subscriber before its first cycle.
//! Execution units inherit it across `fork`, so records from the supervisor,
//! the memory watch and the plugin share one stream and one format.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use sift_config::{LogFormat, Settings};

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the worker's subscriber is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Encoding of the installed subscriber, which is the one requested by
    /// the first successful [`initialise`] call.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `Settings::log_filter` is not a valid filter directive.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Rejected directive.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// A subscriber not installed by this module is already the global
    /// default.
    #[error("failed to install the worker log subscriber: {source}")]
    Subscriber {
        /// Underlying registration error.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the worker's global subscriber on first use.
///
/// Later calls keep the installed subscriber and report its format.
///
/// # Errors
///
/// [`TelemetryError::Filter`] for an unparsable filter,
/// [`TelemetryError::Subscriber`] when a foreign subscriber is installed.
pub fn initialise(settings: &Settings) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install_subscriber(settings).map(|()| settings.log_format()))
        .map(|format| TelemetryHandle { format: *format })
}

fn install_subscriber(settings: &Settings) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(settings.log_filter()).map_err(|error| TelemetryError::Filter {
        filter: settings.log_filter().to_owned(),
        message: error.to_string(),
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match settings.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|source| TelemetryError::Subscriber { source })
}
