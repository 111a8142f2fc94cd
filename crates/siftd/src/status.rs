//! Status events reported for every finished execution.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use sift_plugins::{ExecutionIdentity, State, StateLabel};

/// Author category for plugin executions.
pub const PLUGIN_CATEGORY: &str = "plugin";

/// Who produced a status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Always [`PLUGIN_CATEGORY`] for executions.
    pub category: String,
    /// Reported execution name.
    pub name: String,
    /// Reported execution version.
    pub version: String,
    /// Security classification, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
}

impl From<&ExecutionIdentity> for Author {
    fn from(identity: &ExecutionIdentity) -> Self {
        Self {
            category: String::from(PLUGIN_CATEGORY),
            name: identity.name.clone(),
            version: identity.version.clone(),
            security: identity.security.clone(),
        }
    }
}

/// Outcome of one execution for one input entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Root entity of the job.
    pub input_id: String,
    /// Terminal label.
    pub status: StateLabel,
    /// Failure name, for error states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Timestamped status of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Who ran.
    pub author: Author,
    /// What happened.
    pub entity: EntityStatus,
    /// When the event was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl StatusEvent {
    /// Builds a status event stamped with the current UTC time.
    #[must_use]
    pub fn new(identity: &ExecutionIdentity, input_id: impl Into<String>, state: &State) -> Self {
        Self {
            author: Author::from(identity),
            entity: EntityStatus {
                input_id: input_id.into(),
                status: state.label(),
                error: state.failure_name().map(str::to_owned),
                message: state.message().map(str::to_owned),
            },
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
