//! Watch thread supervising one execution unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use nix::unistd::Pid;
use tracing::{debug, error, warn};

use crate::memory::{MemoryProbe, MemorySample, MemoryVerdict};
use crate::process::{ProcessError, ProcessKiller};

use super::{MONITOR_TARGET, oom_message, warning_message};

/// How the watch ended.
#[derive(Debug)]
pub(super) enum WatchOutcome {
    /// The unit exited on its own.
    Finished,
    /// The unit breached the force-exit fraction and was killed.
    OutOfMemory(MemorySample),
    /// The termination flag was raised and the unit was killed.
    Terminated,
    /// A kill was required but failed.
    KillFailed(ProcessError),
}

pub(super) struct WatchContext {
    pub(super) pid: Pid,
    pub(super) probe: Option<MemoryProbe>,
    pub(super) interval: Duration,
    pub(super) killer: Arc<dyn ProcessKiller>,
    pub(super) termination: Arc<AtomicBool>,
    pub(super) plugin: String,
    pub(super) job: String,
}

impl WatchContext {
    /// Ticks until `stop` fires or the unit has to be killed.
    pub(super) fn run(self, stop: &Receiver<()>) -> WatchOutcome {
        let mut warned = false;
        loop {
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return WatchOutcome::Finished,
            }
            if self.termination.load(Ordering::SeqCst) {
                warn!(
                    target: MONITOR_TARGET,
                    plugin = self.plugin.as_str(),
                    job = self.job.as_str(),
                    pid = self.pid.as_raw(),
                    "termination requested, killing execution unit"
                );
                return self.kill(WatchOutcome::Terminated);
            }
            let Some(probe) = &self.probe else {
                continue;
            };
            match probe.sample() {
                Ok(MemoryVerdict::OutOfMemory(sample)) => {
                    error!(
                        target: MONITOR_TARGET,
                        pid = self.pid.as_raw(),
                        "{}",
                        oom_message(&self.plugin, &self.job, sample)
                    );
                    return self.kill(WatchOutcome::OutOfMemory(sample));
                }
                Ok(MemoryVerdict::Warning(sample)) if !warned => {
                    warned = true;
                    warn!(
                        target: MONITOR_TARGET,
                        pid = self.pid.as_raw(),
                        "{}",
                        warning_message(&self.plugin, &self.job, sample)
                    );
                }
                Ok(_) => {}
                Err(error) => debug!(
                    target: MONITOR_TARGET,
                    %error,
                    "memory sample failed"
                ),
            }
        }
    }

    fn kill(&self, outcome: WatchOutcome) -> WatchOutcome {
        match self.killer.kill_tree(self.pid) {
            Ok(()) => outcome,
            Err(source) => {
                error!(
                    target: MONITOR_TARGET,
                    pid = self.pid.as_raw(),
                    error = %source,
                    "failed to kill execution unit"
                );
                WatchOutcome::KillFailed(source)
            }
        }
    }
}
