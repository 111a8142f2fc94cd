//! Errors raised while describing plugins and while executing a job.
//!
//! [`PluginError`] covers the declaration surface: descriptors, settings and
//! the registry. [`JobError`] is what plugin code sees from the execution
//! context; every variant maps onto a terminal [`State`] through
//! [`JobError::to_state`]. I/O errors are wrapped in `Arc` so both enums stay
//! `Clone`.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::feature::FeatureKind;
use crate::state::{State, StateLabel};

/// Failure name reported for schema violations.
pub const INVALID_OUTPUT: &str = "Invalid Plugin Output";

/// Errors arising from plugin declaration and registration.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// The requested plugin was not found in the registry.
    #[error("plugin '{name}' not found in registry")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// A plugin with the same name is already registered.
    #[error("plugin '{name}' is already registered")]
    Duplicate {
        /// Conflicting plugin name.
        name: String,
    },

    /// A plugin descriptor failed validation.
    #[error("descriptor error: {message}")]
    Descriptor {
        /// Description of the validation failure.
        message: String,
    },

    /// A setting override was undeclared or of the wrong type.
    #[error("setting '{name}' rejected: {message}")]
    Setting {
        /// Setting name.
        name: String,
        /// Why the override was rejected.
        message: String,
    },
}

/// Errors surfaced to plugin code by the execution context.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Feature names absent from the plugin's schema.
    #[error("Plugin tried to set undeclared features: {}", names.join(", "))]
    UndeclaredFeature {
        /// Offending feature names.
        names: Vec<String>,
    },

    /// A value whose kind disagrees with its declaration.
    #[error(
        "Plugin returned a value with incorrect type for feature '{feature}': expected {expected}, got {found}"
    )]
    TypeMismatch {
        /// Feature name.
        feature: String,
        /// Declared kind.
        expected: FeatureKind,
        /// Kind of the rejected value.
        found: FeatureKind,
    },

    /// Content attachments must carry at least one byte.
    #[error("tried to add data file with 0 bytes")]
    EmptyContent,

    /// File or reader content could not be read.
    #[error("failed to read content: {source}")]
    ContentRead {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// An entity handle that does not belong to this job.
    #[error("entity {index} does not exist in this job")]
    UnknownEntity {
        /// Arena index carried by the handle.
        index: usize,
    },

    /// The plugin was asked to run a sub-execution it never registered.
    #[error("sub-execution '{name}' is not registered")]
    UnknownSubExecution {
        /// Requested sub-execution.
        name: String,
    },

    /// A fault raised by plugin code.
    #[error("{name}: {message}")]
    Fault {
        /// Fault kind, reported as the failure name.
        name: String,
        /// Human-readable detail.
        message: String,
    },
}

impl JobError {
    /// Builds a plugin fault with a kind name and message.
    #[must_use]
    pub fn fault(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for schema violations that fail the whole job output.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UndeclaredFeature { .. } | Self::TypeMismatch { .. }
        )
    }

    /// Name reported as the failure name of the terminal state.
    #[must_use]
    pub fn failure_name(&self) -> &str {
        match self {
            Self::UndeclaredFeature { .. } | Self::TypeMismatch { .. } => INVALID_OUTPUT,
            Self::EmptyContent => "ValueError",
            Self::ContentRead { .. } => "IOError",
            Self::UnknownEntity { .. } => "LookupError",
            Self::UnknownSubExecution { .. } => "UnknownSubExecution",
            Self::Fault { name, .. } => name.as_str(),
        }
    }

    /// Converts the error into the terminal state of the job.
    #[must_use]
    pub fn to_state(&self) -> State {
        if self.is_validation() {
            return State::with_failure(
                StateLabel::ErrorOutput,
                INVALID_OUTPUT,
                format!("ResultError: {self}"),
            );
        }
        let message = match self {
            Self::Fault { message, .. } => message.clone(),
            other => other.to_string(),
        };
        State::with_failure(StateLabel::ErrorException, self.failure_name(), message)
    }
}

impl From<io::Error> for JobError {
    fn from(source: io::Error) -> Self {
        Self::ContentRead {
            source: Arc::new(source),
        }
    }
}
