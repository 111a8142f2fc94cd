//! Worker runtime for sift plugins.
//!
//! A worker runs one plugin against a stream of jobs handed out by a
//! [`Dispatcher`]. The [`Coordinator`] owns the loop: it fetches a job, hands
//! it to the [`Monitor`] and reports every execution's result and status back
//! to the dispatcher, retrying transient dispatcher failures.
//!
//! The monitor runs each execution in a forked execution unit so a
//! misbehaving plugin cannot take the worker down with it. A watch thread
//! samples cgroup memory counters while the unit runs and kills the whole
//! process tree when usage crosses the force-exit fraction; the job is then
//! reported as `ERROR_OOM`. Results travel back through a framed artefact in
//! the result directory.
//!
//! ## Shutdown
//!
//! [`run_worker`] installs the log subscriber and the signal handlers before
//! running the loop. [`install_signal_handlers`] maps the first
//! `SIGTERM`/`SIGINT` to a drain: the job in flight finishes and is reported,
//! then the loop stops before the next fetch. A second signal forces the
//! issue and kills the running unit.
//!
//! ```text
//! before_fetch -> fetch -> job_in_flight -> run_once -> report -> before_fetch -> (drained)
//! ```

pub mod coordinator;
pub mod dispatcher;
pub mod memory;
pub mod monitor;
pub mod process;
pub mod status;
mod telemetry;
mod worker;

pub use coordinator::{
    ChannelObserver, Coordinator, CoordinatorError, CycleObserver, LoopSummary, ShutdownLevel,
    ShutdownToken, SignalListener, TracingObserver, install_signal_handlers,
};
pub use dispatcher::{DispatchError, Dispatcher, PluginRegistration, ResultReport};
pub use memory::{MemoryError, MemoryProbe, MemorySample, MemoryVerdict};
pub use monitor::{JobResults, Monitor, MonitorError, OOM_FAILURE, UNIT_FAILURE};
pub use process::{ArtifactError, ProcessError, ProcessKiller, SystemProcessKiller};
pub use status::{Author, EntityStatus, PLUGIN_CATEGORY, StatusEvent};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use worker::{WorkerError, run_worker};

#[cfg(test)]
mod tests;
