//! Test double for [`Dispatcher`] that replays scripted fetches and records
//! everything reported to it.

use std::collections::VecDeque;
use std::sync::Mutex;

use sift_plugins::JobRequest;

use crate::coordinator::ShutdownToken;
use crate::dispatcher::{DispatchError, Dispatcher, PluginRegistration, ResultReport};
use crate::status::StatusEvent;

/// Outcome of one scripted fetch.
pub type FetchOutcome = Result<Option<JobRequest>, DispatchError>;

/// Replays scripted fetches; an exhausted script reports an empty queue.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    pub fetches: Mutex<VecDeque<FetchOutcome>>,
    pub report_failures: Mutex<VecDeque<DispatchError>>,
    pub register_failure: Option<DispatchError>,
    pub drain_on_report: Option<ShutdownToken>,
    pub fetch_calls: Mutex<usize>,
    pub registrations: Mutex<Vec<PluginRegistration>>,
    pub reports: Mutex<Vec<ResultReport>>,
    pub statuses: Mutex<Vec<StatusEvent>>,
}

impl RecordingDispatcher {
    pub fn with_fetches(fetches: impl IntoIterator<Item = FetchOutcome>) -> Self {
        Self {
            fetches: Mutex::new(fetches.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock().expect("fetch calls mutex poisoned")
    }

    /// Registered `(name, version)` pairs in registration order.
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.registrations
            .lock()
            .expect("registrations mutex poisoned")
            .iter()
            .map(|reg| (reg.identity.name.clone(), reg.identity.version.clone()))
            .collect()
    }

    pub fn reports(&self) -> Vec<ResultReport> {
        self.reports.lock().expect("reports mutex poisoned").clone()
    }

    pub fn statuses(&self) -> Vec<StatusEvent> {
        self.statuses.lock().expect("statuses mutex poisoned").clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn register(&self, registration: &PluginRegistration) -> Result<(), DispatchError> {
        if let Some(error) = &self.register_failure {
            return Err(error.clone());
        }
        self.registrations
            .lock()
            .expect("registrations mutex poisoned")
            .push(registration.clone());
        Ok(())
    }

    fn fetch_job(&self) -> Result<Option<JobRequest>, DispatchError> {
        *self.fetch_calls.lock().expect("fetch calls mutex poisoned") += 1;
        self.fetches
            .lock()
            .expect("fetches mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(None))
    }

    fn report_result(&self, report: &ResultReport) -> Result<(), DispatchError> {
        let failure = self
            .report_failures
            .lock()
            .expect("failures mutex poisoned")
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.reports
            .lock()
            .expect("reports mutex poisoned")
            .push(report.clone());
        if let Some(token) = &self.drain_on_report {
            token.request_drain();
        }
        Ok(())
    }

    fn report_status(&self, status: &StatusEvent) -> Result<(), DispatchError> {
        self.statuses
            .lock()
            .expect("statuses mutex poisoned")
            .push(status.clone());
        Ok(())
    }
}

/// A queued job whose root entity is `{id}-entity`.
pub fn job(id: &str) -> FetchOutcome {
    Ok(Some(JobRequest::new(id, format!("{id}-entity"))))
}

pub fn unavailable() -> DispatchError {
    DispatchError::Unavailable {
        message: String::from("connection refused"),
    }
}
