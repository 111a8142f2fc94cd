//! The fetch, execute and report loop of one worker.
//!
//! A [`Coordinator`] owns one [`Monitor`] and one [`Dispatcher`]. Every cycle
//! it announces itself to the [`CycleObserver`], checks for a drain request,
//! asks the plugin whether it is ready, fetches a job, runs it and reports the
//! result and status of every execution. Transient dispatcher failures are
//! retried with a linear backoff; any other failure skips the cycle and pauses
//! for `delay_after_exception`.
//!
//! Shutdown is graceful by default. A drain lets the job in flight finish and
//! be reported before the loop stops; a force request kills the execution
//! unit through the monitor's termination flag.

mod observer;
mod shutdown;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use sift_config::{Settings, SettingsError};
use sift_plugins::{ExecutionIdentity, JobError, JobRequest, Plugin, identity_of};

use crate::dispatcher::{DispatchError, Dispatcher, PluginRegistration, ResultReport};
use crate::monitor::{JobResults, Monitor, MonitorError};
use crate::process::{ProcessKiller, cleanup_stale_artifacts};
use crate::status::StatusEvent;

pub use self::observer::{ChannelObserver, CycleObserver, TracingObserver};
pub use self::shutdown::{ShutdownLevel, ShutdownToken, SignalListener, install_signal_handlers};

pub(crate) const COORDINATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::coordinator");

const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Errors that stop the loop before it starts or while it sets up.
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    /// The settings are incoherent.
    #[error("invalid settings: {source}")]
    Settings {
        /// Validation failure.
        #[source]
        source: SettingsError,
    },
    /// The dispatcher refused a registration.
    #[error("failed to register with the dispatcher: {source}")]
    Registration {
        /// Dispatcher failure after retries.
        #[source]
        source: DispatchError,
    },
    /// Shutdown signal handling could not be installed.
    #[error("failed to install shutdown signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Counters describing a finished loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Cycles started.
    pub iterations: usize,
    /// Jobs run and fully reported.
    pub jobs_completed: usize,
    /// Cycles skipped because of a failure.
    pub failures: usize,
    /// The loop stopped on a drain request.
    pub drained: bool,
    /// The loop stopped because the job in flight was force-terminated.
    pub terminated: bool,
}

#[derive(Debug, Error)]
enum CycleError {
    #[error("dispatcher call '{operation}' failed: {source}")]
    Dispatch {
        operation: &'static str,
        #[source]
        source: DispatchError,
    },
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("cannot report execution: {source}")]
    Identity {
        #[source]
        source: JobError,
    },
}

enum Cycle {
    Completed,
    Idle,
    Drained,
}

/// Runs jobs from a dispatcher through a monitored plugin.
pub struct Coordinator<D: Dispatcher> {
    monitor: Monitor,
    settings: Settings,
    dispatcher: D,
    observer: Box<dyn CycleObserver>,
    shutdown: ShutdownToken,
}

impl<D: Dispatcher + fmt::Debug> fmt::Debug for Coordinator<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("monitor", &self.monitor)
            .field("dispatcher", &self.dispatcher)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl<D: Dispatcher> Coordinator<D> {
    /// A coordinator with a fresh shutdown token and a tracing observer.
    #[must_use]
    pub fn new(plugin: Arc<dyn Plugin>, settings: Settings, dispatcher: D) -> Self {
        let shutdown = ShutdownToken::new();
        let monitor = Monitor::new(plugin, settings.clone()).with_termination(shutdown.force_flag());
        Self {
            monitor,
            settings,
            dispatcher,
            observer: Box::new(TracingObserver),
            shutdown,
        }
    }

    /// Replaces the cycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl CycleObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Shares a shutdown token, typically one fed by
    /// [`install_signal_handlers`].
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownToken) -> Self {
        self.monitor = self.monitor.with_termination(shutdown.force_flag());
        self.shutdown = shutdown;
        self
    }

    /// Replaces the process killer used by the monitor.
    #[must_use]
    pub fn with_killer(mut self, killer: Arc<dyn ProcessKiller>) -> Self {
        self.monitor = self.monitor.with_killer(killer);
        self
    }

    /// The dispatcher collaborator.
    #[must_use]
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// The shutdown token observed by the loop.
    #[must_use]
    pub const fn shutdown(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Runs cycles until `max_iterations` is reached, a drain is requested or
    /// the job in flight is force-terminated. `None` loops until shutdown.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError`] when the settings are invalid or registration
    /// fails. Failures inside a cycle are logged and counted instead.
    pub fn run_loop(&self, max_iterations: Option<usize>) -> Result<LoopSummary, CoordinatorError> {
        self.settings
            .validate()
            .map_err(|source| CoordinatorError::Settings { source })?;
        self.startup()?;

        let mut summary = LoopSummary::default();
        while max_iterations.is_none_or(|max| summary.iterations < max) {
            summary.iterations += 1;
            match self.cycle() {
                Ok(Cycle::Completed) => summary.jobs_completed += 1,
                Ok(Cycle::Idle) => {}
                Ok(Cycle::Drained) => {
                    summary.drained = true;
                    break;
                }
                Err(CycleError::Monitor(MonitorError::Terminated { job })) => {
                    warn!(target: COORDINATOR_TARGET, job = job.as_str(), "job terminated on shutdown");
                    summary.terminated = true;
                    break;
                }
                Err(error) => {
                    summary.failures += 1;
                    error!(target: COORDINATOR_TARGET, %error, "cycle failed");
                    self.pause(self.settings.delay_after_exception());
                }
            }
        }
        info!(
            target: COORDINATOR_TARGET,
            iterations = summary.iterations,
            jobs = summary.jobs_completed,
            failures = summary.failures,
            drained = summary.drained,
            terminated = summary.terminated,
            "coordinator loop stopped"
        );
        Ok(summary)
    }

    fn startup(&self) -> Result<(), CoordinatorError> {
        match cleanup_stale_artifacts(self.settings.result_dir()) {
            Ok(0) => {}
            Ok(removed) => info!(target: COORDINATOR_TARGET, removed, "removed stale result artefacts"),
            Err(error) => warn!(target: COORDINATOR_TARGET, %error, "stale artefact cleanup failed"),
        }

        let plugin = self.monitor.plugin();
        let descriptor = plugin.descriptor();
        let identities = std::iter::once(ExecutionIdentity::main(descriptor)).chain(
            plugin
                .sub_executions()
                .iter()
                .map(|sub| ExecutionIdentity::sub(descriptor, sub)),
        );
        for identity in identities {
            let registration = PluginRegistration::new(identity, descriptor);
            self.retry("register", || self.dispatcher.register(&registration))
                .map_err(|source| CoordinatorError::Registration { source })?;
            info!(
                target: COORDINATOR_TARGET,
                plugin = registration.identity.name.as_str(),
                version = registration.identity.version.as_str(),
                "registered execution"
            );
        }
        Ok(())
    }

    fn cycle(&self) -> Result<Cycle, CycleError> {
        self.observer.before_fetch();
        if self.shutdown.drain_requested() {
            info!(target: COORDINATOR_TARGET, "drain requested, no further jobs fetched");
            return Ok(Cycle::Drained);
        }
        if !self.monitor.plugin().is_ready() {
            debug!(target: COORDINATOR_TARGET, "plugin not ready");
            self.pause(self.settings.idle_delay());
            return Ok(Cycle::Idle);
        }

        let fetched = self
            .retry("fetch job", || {
                if self.shutdown.drain_requested() {
                    Ok(None)
                } else {
                    self.dispatcher.fetch_job()
                }
            })
            .map_err(|source| CycleError::Dispatch {
                operation: "fetch job",
                source,
            })?;
        let Some(request) = fetched else {
            debug!(target: COORDINATOR_TARGET, "no job available");
            self.pause(self.settings.idle_delay());
            return Ok(Cycle::Idle);
        };

        self.observer.job_in_flight(&request.id);
        info!(target: COORDINATOR_TARGET, job = request.id.as_str(), "job fetched");
        let results = self.monitor.run_once(&request)?;
        self.report(&request, results)?;
        Ok(Cycle::Completed)
    }

    fn report(&self, request: &JobRequest, results: JobResults) -> Result<(), CycleError> {
        for (sub, result) in results {
            let identity = identity_of(self.monitor.plugin().as_ref(), sub.as_deref())
                .map_err(|source| CycleError::Identity { source })?;
            let status = StatusEvent::new(&identity, request.entity_id.as_str(), &result.state);
            let report = ResultReport {
                identity,
                job_id: request.id.clone(),
                entity_id: request.entity_id.clone(),
                result,
            };
            self.retry("report result", || self.dispatcher.report_result(&report))
                .map_err(|source| CycleError::Dispatch {
                    operation: "report result",
                    source,
                })?;
            self.retry("report status", || self.dispatcher.report_status(&status))
                .map_err(|source| CycleError::Dispatch {
                    operation: "report status",
                    source,
                })?;
            info!(
                target: COORDINATOR_TARGET,
                plugin = report.identity.name.as_str(),
                job = request.id.as_str(),
                state = report.result.state.label().as_str(),
                "execution reported"
            );
        }
        Ok(())
    }

    /// Calls `call` until it succeeds, fails permanently or has been retried
    /// `request_retry_count` times. Failed attempt `n` is followed by a pause
    /// of `n` retry delays, cut short by a drain request.
    fn retry<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut() -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let attempts = self.settings.request_retry_count.saturating_add(1);
        let mut attempt: u32 = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < attempts => {
                    warn!(
                        target: COORDINATOR_TARGET,
                        operation,
                        attempt,
                        %error,
                        "dispatcher call failed, retrying"
                    );
                    self.pause(self.settings.request_retry_delay() * attempt);
                    attempt += 1;
                }
                Err(error) => {
                    error!(
                        target: COORDINATOR_TARGET,
                        operation,
                        attempts = attempt,
                        %error,
                        "dispatcher call failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Sleeps for `duration`, waking early on a drain request.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.shutdown.drain_requested() {
                return;
            }
            thread::sleep(remaining.min(PAUSE_SLICE));
        }
    }
}

#[cfg(test)]
mod tests;
