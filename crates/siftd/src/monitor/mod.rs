//! Supervised execution of a plugin in forked execution units.
//!
//! Every execution (the main one and each sub-execution) runs in its own
//! forked process, which leads its own process group and restores the
//! default `SIGTERM`/`SIGINT` dispositions. The unit runs the plugin, writes
//! its [`JobResult`] to a result artefact and exits; the supervisor waits for
//! it and reads the artefact back.
//!
//! While a unit runs, a watch thread in the supervisor samples memory at the
//! configured interval and observes the termination flag:
//!
//! ```text
//! READY -> RUNNING -> COMPLETED | ERROR_*            (unit exits on its own)
//!          RUNNING -> TERMINATING -> ERROR_OOM       (force-exit fraction reached)
//!          RUNNING -> TERMINATING -> Terminated      (termination flag raised)
//! ```
//!
//! The watch thread is the only component that kills a unit. Kills go
//! through a [`ProcessKiller`] so tests can observe them.

mod watch;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid, waitpid};
use nix::unistd::{ForkResult, Pid, fork, setpgid};
use thiserror::Error;
use tracing::{debug, info, warn};

use sift_config::Settings;
use sift_plugins::{
    JobRequest, JobResult, Plugin, State, StateLabel, execute_request, identity_of,
};

use crate::memory::{MemoryProbe, MemorySample};
use crate::process::artifact::{next_artifact_path, temporary_path};
use crate::process::{
    ArtifactError, ProcessError, ProcessKiller, SystemProcessKiller, read_artifact, write_artifact,
};

use self::watch::{WatchContext, WatchOutcome};

pub(crate) const MONITOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");

/// Failure name of out-of-memory results.
pub const OOM_FAILURE: &str = "Out of Memory";

/// Failure name when a unit exits without leaving a result.
pub const UNIT_FAILURE: &str = "Execution Unit Failed";

/// Results of one job keyed by sub-execution name; `None` is the main
/// execution.
pub type JobResults = BTreeMap<Option<String>, JobResult>;

/// Errors preventing a job from producing results.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The result directory could not be prepared.
    #[error("failed to prepare result directory '{}': {source}", path.display())]
    ResultDir {
        /// Configured directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The execution unit could not be forked.
    #[error("failed to fork execution unit: {source}")]
    Fork {
        /// Underlying errno.
        #[source]
        source: Errno,
    },
    /// The watch thread could not be started.
    #[error("failed to start memory watch: {source}")]
    Watch {
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Waiting for the unit failed.
    #[error("failed to wait for execution unit {pid}: {source}")]
    Wait {
        /// Unit pid.
        pid: i32,
        /// Underlying errno.
        #[source]
        source: Errno,
    },
    /// The unit's result artefact was unreadable.
    #[error("failed to collect result of execution unit {pid}: {source}")]
    Artifact {
        /// Unit pid.
        pid: i32,
        /// Underlying artefact error.
        #[source]
        source: ArtifactError,
    },
    /// The unit could not be killed.
    #[error("failed to kill execution unit {pid}: {source}")]
    KillFailed {
        /// Unit pid.
        pid: i32,
        /// Underlying kill error.
        #[source]
        source: ProcessError,
    },
    /// The termination flag was raised while the job ran.
    #[error("execution of job '{job}' was terminated")]
    Terminated {
        /// Job identifier.
        job: String,
    },
}

/// Runs jobs for one plugin under memory supervision.
pub struct Monitor {
    plugin: Arc<dyn Plugin>,
    settings: Settings,
    killer: Arc<dyn ProcessKiller>,
    termination: Arc<AtomicBool>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("plugin", &self.plugin.descriptor().name())
            .field("settings", &self.settings)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// A monitor that kills through [`SystemProcessKiller`].
    #[must_use]
    pub fn new(plugin: Arc<dyn Plugin>, settings: Settings) -> Self {
        Self {
            plugin,
            settings,
            killer: Arc::new(SystemProcessKiller),
            termination: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the process killer.
    #[must_use]
    pub fn with_killer(mut self, killer: Arc<dyn ProcessKiller>) -> Self {
        self.killer = killer;
        self
    }

    /// Shares an external termination flag. Raising it kills the running
    /// unit and makes [`Monitor::run_once`] return
    /// [`MonitorError::Terminated`].
    #[must_use]
    pub fn with_termination(mut self, flag: Arc<AtomicBool>) -> Self {
        self.termination = flag;
        self
    }

    /// The supervised plugin.
    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// Runs the main execution and then every sub-execution of the plugin.
    ///
    /// The memory ceiling is read once and applies to every execution.
    ///
    /// # Errors
    ///
    /// [`MonitorError`] when supervision itself fails or the job is
    /// terminated. Plugin failures and out-of-memory kills are results, not
    /// errors.
    pub fn run_once(&self, request: &JobRequest) -> Result<JobResults, MonitorError> {
        let dir = self.settings.result_dir();
        fs::create_dir_all(dir).map_err(|source| MonitorError::ResultDir {
            path: dir.to_path_buf(),
            source: Arc::new(source),
        })?;
        let probe = MemoryProbe::setup(&self.settings.memory);

        let mut results = JobResults::new();
        results.insert(None, self.run_execution(None, request, probe.as_ref())?);
        for sub in self.plugin.sub_executions() {
            let result = self.run_execution(Some(&sub.name), request, probe.as_ref())?;
            results.insert(Some(sub.name.clone()), result);
        }
        Ok(results)
    }

    fn run_execution(
        &self,
        sub: Option<&str>,
        request: &JobRequest,
        probe: Option<&MemoryProbe>,
    ) -> Result<JobResult, MonitorError> {
        let name = match identity_of(self.plugin.as_ref(), sub) {
            Ok(identity) => identity.name,
            Err(err) => return Ok(JobResult::empty(err.to_state())),
        };
        if self.termination.load(Ordering::SeqCst) {
            return Err(MonitorError::Terminated {
                job: request.id.clone(),
            });
        }

        let path = next_artifact_path(self.settings.result_dir());
        // SAFETY: the child only runs the plugin, writes the artefact and
        // leaves through `_exit` without returning into the caller.
        let child = match unsafe { fork() }.map_err(|source| MonitorError::Fork { source })? {
            ForkResult::Child => run_unit(self.plugin.as_ref(), sub, request, &path),
            ForkResult::Parent { child } => child,
        };
        let _ = setpgid(child, child);
        info!(
            target: MONITOR_TARGET,
            plugin = name.as_str(),
            job = request.id.as_str(),
            pid = child.as_raw(),
            "execution unit started"
        );

        let (stop, outcome) = self.start_watch(child, probe, &name, &request.id)?;
        // The unit stays a zombie until the watch has stopped, so neither its
        // pid nor its process group can be reused while a kill is possible.
        let exited = wait_for_exit(child);
        let _ = stop.send(());
        let outcome = outcome.join().unwrap_or_else(|_| {
            warn!(target: MONITOR_TARGET, pid = child.as_raw(), "memory watch panicked");
            WatchOutcome::Finished
        });
        if matches!(outcome, WatchOutcome::Finished)
            && let Err(error) = self.killer.reap_group(child)
        {
            warn!(
                target: MONITOR_TARGET,
                pid = child.as_raw(),
                %error,
                "failed to reap execution unit group"
            );
        }
        let status = exited
            .and_then(|()| wait_for(child))
            .map_err(|source| MonitorError::Wait {
                pid: child.as_raw(),
                source,
            })?;
        debug!(
            target: MONITOR_TARGET,
            pid = child.as_raw(),
            status = describe(status).as_str(),
            "execution unit exited"
        );

        match outcome {
            WatchOutcome::Finished => collect(child, &path, status),
            WatchOutcome::OutOfMemory(sample) => {
                discard(&path);
                Ok(JobResult::empty(State::with_failure(
                    StateLabel::ErrorOom,
                    OOM_FAILURE,
                    oom_message(&name, &request.id, sample),
                )))
            }
            WatchOutcome::Terminated => {
                discard(&path);
                Err(MonitorError::Terminated {
                    job: request.id.clone(),
                })
            }
            WatchOutcome::KillFailed(source) => {
                discard(&path);
                Err(MonitorError::KillFailed {
                    pid: child.as_raw(),
                    source,
                })
            }
        }
    }

    fn start_watch(
        &self,
        child: Pid,
        probe: Option<&MemoryProbe>,
        plugin: &str,
        job: &str,
    ) -> Result<(mpsc::Sender<()>, thread::JoinHandle<WatchOutcome>), MonitorError> {
        let (stop, stopped) = mpsc::channel();
        let context = WatchContext {
            pid: child,
            probe: probe.cloned(),
            interval: self.settings.memory.poll_interval(),
            killer: Arc::clone(&self.killer),
            termination: Arc::clone(&self.termination),
            plugin: plugin.to_owned(),
            job: job.to_owned(),
        };
        let dispatch = tracing::dispatcher::get_default(Clone::clone);
        let spawned = thread::Builder::new()
            .name(String::from("memory-watch"))
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || context.run(&stopped)));
        match spawned {
            Ok(handle) => Ok((stop, handle)),
            Err(source) => {
                let _ = self.killer.kill_tree(child);
                let _ = wait_for(child);
                Err(MonitorError::Watch {
                    source: Arc::new(source),
                })
            }
        }
    }
}

/// Body of the execution unit. Never returns.
fn run_unit(plugin: &dyn Plugin, sub: Option<&str>, request: &JobRequest, path: &Path) -> ! {
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    for signal_kind in [Signal::SIGTERM, Signal::SIGINT] {
        // SAFETY: restoring the default disposition installs no handler.
        let _ = unsafe { signal(signal_kind, SigHandler::SigDfl) };
    }
    let result = execute_request(plugin, sub, request.clone());
    let code = i32::from(write_artifact(path, &result).is_err());
    // SAFETY: `_exit` only terminates the calling process; the forked unit
    // must not run exit handlers inherited from the supervisor.
    unsafe { libc::_exit(code) }
}

/// Blocks until `child` has exited without reaping it.
fn wait_for_exit(child: Pid) -> Result<(), Errno> {
    loop {
        match waitid(Id::Pid(child), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => {}
            Ok(_) => return Ok(()),
            Err(errno) => return Err(errno),
        }
    }
}

/// Reaps `child`.
fn wait_for(child: Pid) -> Result<WaitStatus, Errno> {
    loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => {}
            other => return other,
        }
    }
}

fn collect(child: Pid, path: &Path, status: WaitStatus) -> Result<JobResult, MonitorError> {
    match read_artifact(path) {
        Ok(result) => Ok(result),
        Err(ArtifactError::Missing { .. }) => {
            let message = format!(
                "execution unit exited with {} without writing a result",
                describe(status)
            );
            warn!(
                target: MONITOR_TARGET,
                pid = child.as_raw(),
                message = message.as_str(),
                "missing result artefact"
            );
            Ok(JobResult::empty(State::with_failure(
                StateLabel::ErrorException,
                UNIT_FAILURE,
                message,
            )))
        }
        Err(source) => Err(MonitorError::Artifact {
            pid: child.as_raw(),
            source,
        }),
    }
}

/// Removes the artefact of a killed unit and any half-written sibling.
fn discard(path: &Path) {
    for leftover in [path.to_path_buf(), temporary_path(path)] {
        match fs::remove_file(&leftover) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: MONITOR_TARGET,
                path = %leftover.display(),
                %error,
                "failed to discard result artefact"
            ),
        }
    }
}

fn describe(status: WaitStatus) -> String {
    match status {
        WaitStatus::Exited(_, code) => format!("exit code {code}"),
        WaitStatus::Signaled(_, signal_kind, _) => format!("signal {signal_kind}"),
        other => format!("{other:?}"),
    }
}

pub(crate) fn oom_message(plugin: &str, job: &str, sample: MemorySample) -> String {
    format!(
        "Plugin {plugin} failed to complete job '{job}' because it ran out of memory, memory \
         limit is {limit}B and memory usage was {usage}B which is {percent:.1}% memory usage.",
        limit = sample.limit,
        usage = sample.usage,
        percent = sample.percent(),
    )
}

pub(crate) fn warning_message(plugin: &str, job: &str, sample: MemorySample) -> String {
    format!(
        "Plugin {plugin} job '{job}' is nearly out of memory it is at {percent:.1}% memory usage",
        percent = sample.percent(),
    )
}
