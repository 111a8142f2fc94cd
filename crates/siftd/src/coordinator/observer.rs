//! Observation points of the coordinator loop.

use std::sync::Arc;
use std::sync::mpsc;

use tracing::debug;

use super::COORDINATOR_TARGET;

/// Receives a marker before every fetch and while a job is in flight.
///
/// An observer that sees a job marker followed by a final no-event marker
/// knows the loop stopped between jobs rather than inside one.
pub trait CycleObserver: Send + Sync {
    /// Invoked immediately before the loop considers fetching.
    fn before_fetch(&self);

    /// Invoked once a job has been fetched and is about to run.
    fn job_in_flight(&self, job_id: &str);
}

impl<T> CycleObserver for Arc<T>
where
    T: CycleObserver,
{
    fn before_fetch(&self) {
        (**self).before_fetch();
    }

    fn job_in_flight(&self, job_id: &str) {
        (**self).job_in_flight(job_id);
    }
}

/// Sends `None` before each fetch and `Some(job_id)` for each job.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::Sender<Option<String>>,
}

impl ChannelObserver {
    /// An observer with its receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<Option<String>>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl CycleObserver for ChannelObserver {
    fn before_fetch(&self) {
        let _ = self.sender.send(None);
    }

    fn job_in_flight(&self, job_id: &str) {
        let _ = self.sender.send(Some(job_id.to_owned()));
    }
}

/// Default observer recording markers with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CycleObserver for TracingObserver {
    fn before_fetch(&self) {
        debug!(target: COORDINATOR_TARGET, event = "before_fetch", "polling for work");
    }

    fn job_in_flight(&self, job_id: &str) {
        debug!(
            target: COORDINATOR_TARGET,
            event = "job_in_flight",
            job = job_id,
            "job in flight"
        );
    }
}
