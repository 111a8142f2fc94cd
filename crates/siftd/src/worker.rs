//! Worker entry point: logging, signal handling and the coordinator loop.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use sift_config::Settings;
use sift_plugins::Plugin;

use crate::coordinator::{
    Coordinator, CoordinatorError, LoopSummary, ShutdownToken, install_signal_handlers,
};
use crate::dispatcher::Dispatcher;
use crate::telemetry::{self, TelemetryError};

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Errors that stop a worker before or while it runs its loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The log subscriber could not be installed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Signal handling, settings or registration failed.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Runs `plugin` against `dispatcher` until `SIGTERM`/`SIGINT` drains or
/// terminates the loop.
///
/// # Errors
///
/// [`WorkerError`] when telemetry, signal handlers, settings validation or
/// registration fail.
pub fn run_worker<D: Dispatcher>(
    plugin: Arc<dyn Plugin>,
    settings: Settings,
    dispatcher: D,
) -> Result<LoopSummary, WorkerError> {
    let telemetry =
        telemetry::initialise(&settings).map_err(|source| WorkerError::Telemetry { source })?;
    let shutdown = ShutdownToken::new();
    let listener = install_signal_handlers(&shutdown)?;
    info!(
        target: WORKER_TARGET,
        plugin = plugin.descriptor().name(),
        log_format = %telemetry.format(),
        result_dir = %settings.result_dir().display(),
        "worker starting"
    );

    let summary = Coordinator::new(plugin, settings, dispatcher)
        .with_shutdown(shutdown)
        .run_loop(None)?;
    drop(listener);
    Ok(summary)
}
