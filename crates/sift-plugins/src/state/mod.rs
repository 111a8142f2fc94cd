//! Closed vocabulary of job outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome classification of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLabel {
    /// The plugin contributed at least one feature, child or attachment.
    Completed,
    /// The plugin finished without contributing anything.
    CompletedEmpty,
    /// The plugin rejected its input.
    ErrorInput,
    /// The plugin produced output that violates its declarations.
    ErrorOutput,
    /// The plugin faulted.
    ErrorException,
    /// The execution unit breached its memory ceiling.
    ErrorOom,
}

impl StateLabel {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedEmpty => "completed_empty",
            Self::ErrorInput => "error_input",
            Self::ErrorOutput => "error_output",
            Self::ErrorException => "error_exception",
            Self::ErrorOom => "error_oom",
        }
    }

    /// Returns `true` for either completed label.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedEmpty)
    }

    /// Returns `true` for the error labels.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !self.is_completed()
    }
}

impl fmt::Display for StateLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of an execution: label plus optional failure detail.
///
/// # Example
///
/// ```
/// use sift_plugins::{State, StateLabel};
///
/// let state = State::with_failure(StateLabel::ErrorInput, "Bad Header", "no magic");
/// assert!(state.label().is_error());
/// assert_eq!(state.failure_name(), Some("Bad Header"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    label: StateLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl State {
    /// A state with no failure detail.
    #[must_use]
    pub const fn new(label: StateLabel) -> Self {
        Self {
            label,
            failure_name: None,
            message: None,
        }
    }

    /// Shorthand for [`StateLabel::Completed`].
    #[must_use]
    pub const fn completed() -> Self {
        Self::new(StateLabel::Completed)
    }

    /// A state carrying a failure name and message.
    #[must_use]
    pub fn with_failure(
        label: StateLabel,
        failure_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            label,
            failure_name: Some(failure_name.into()),
            message: Some(message.into()),
        }
    }

    /// Replaces the label, keeping any detail.
    #[must_use]
    pub fn relabel(mut self, label: StateLabel) -> Self {
        self.label = label;
        self
    }

    /// Outcome label.
    #[must_use]
    pub const fn label(&self) -> StateLabel {
        self.label
    }

    /// Short failure name, e.g. `Out of Memory`.
    #[must_use]
    pub fn failure_name(&self) -> Option<&str> {
        self.failure_name.as_deref()
    }

    /// Human-readable failure message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::completed()
    }
}
