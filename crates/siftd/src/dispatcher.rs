//! Interface to the service that hands out jobs and collects results.
//!
//! The transport is not part of this crate; embedders implement
//! [`Dispatcher`] over whatever protocol their deployment uses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sift_plugins::{
    ExecutionIdentity, Feature, JobRequest, JobResult, PluginDescriptor, SettingsSchema,
};

use crate::status::StatusEvent;

/// Errors returned by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A transient failure; the call may be retried.
    #[error("dispatcher unavailable: {message}")]
    Unavailable {
        /// Detail from the transport.
        message: String,
    },
    /// The dispatcher refused the request; retrying will not help.
    #[error("dispatcher rejected request: {message}")]
    Rejected {
        /// Detail from the dispatcher.
        message: String,
    },
}

impl DispatchError {
    /// Returns `true` for failures worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// What an execution announces about itself on startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRegistration {
    /// Reported name, version and security.
    pub identity: ExecutionIdentity,
    /// Declared features, base set included.
    pub features: Vec<Feature>,
    /// Declared settings.
    pub settings: SettingsSchema,
}

impl PluginRegistration {
    /// Registration of one execution of a plugin.
    #[must_use]
    pub fn new(identity: ExecutionIdentity, descriptor: &PluginDescriptor) -> Self {
        Self {
            identity,
            features: descriptor.features().features().to_vec(),
            settings: descriptor.settings().clone(),
        }
    }
}

/// Result of one execution, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReport {
    /// Execution that produced the result.
    pub identity: ExecutionIdentity,
    /// Job the result belongs to.
    pub job_id: String,
    /// Root entity of the job.
    pub entity_id: String,
    /// The result, including content blobs.
    pub result: JobResult,
}

/// Source of jobs and sink of results.
pub trait Dispatcher: Send + Sync {
    /// Announces an execution before the first fetch.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] from the transport.
    fn register(&self, registration: &PluginRegistration) -> Result<(), DispatchError> {
        let _ = registration;
        Ok(())
    }

    /// Fetches the next job; `None` when no work is queued.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] from the transport.
    fn fetch_job(&self) -> Result<Option<JobRequest>, DispatchError>;

    /// Submits the result of one execution.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] from the transport.
    fn report_result(&self, report: &ResultReport) -> Result<(), DispatchError>;

    /// Submits the status of one execution.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] from the transport.
    fn report_status(&self, status: &StatusEvent) -> Result<(), DispatchError>;
}
