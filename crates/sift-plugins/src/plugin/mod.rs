//! Plugin declaration surface and in-process execution.
//!
//! A plugin is any type implementing [`Plugin`]. Its [`PluginDescriptor`]
//! names it and declares the features and settings it may use; descriptors
//! derive from one another so a plugin family can share declarations.
//! [`execute_request`] runs one execution against a request and always yields
//! a [`JobResult`]: plugin errors and panics become error states.

mod settings;

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assembler::{ExecuteResult, JobResult, finish};
use crate::error::{JobError, PluginError};
use crate::feature::{Feature, FeatureSchema};
use crate::job::{Job, JobRequest};
use crate::state::{State, StateLabel};

pub use self::settings::{ResolvedSettings, SettingSpec, SettingsSchema};

const EXECUTE_TARGET: &str = "sift_plugins::plugin";

/// Failure name reported when setting overrides are rejected.
pub const INVALID_SETTINGS: &str = "Invalid Settings";

/// Failure name reported when plugin code panics.
pub const PANIC_FAILURE: &str = "panic";

/// Identity and declarations of a plugin.
///
/// # Example
///
/// ```
/// use sift_plugins::{Feature, FeatureKind, PluginDescriptor};
///
/// let parent = PluginDescriptor::new("Unpacker", "1.0")
///     .with_features(vec![Feature::new("entropy", "Shannon entropy", FeatureKind::Integer)]);
/// let child = PluginDescriptor::derive_from(&parent, "ZipUnpacker", "2.0")
///     .with_features(vec![Feature::unspecified("zip_comment", "Archive comment")]);
///
/// assert!(child.features().get("entropy").is_some());
/// assert!(child.features().get("zip_comment").is_some());
/// assert!(parent.features().get("zip_comment").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    security: Option<String>,
    features: FeatureSchema,
    #[serde(default)]
    settings: SettingsSchema,
}

impl PluginDescriptor {
    /// A descriptor holding the base features and no settings.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            security: None,
            features: FeatureSchema::base(),
            settings: SettingsSchema::new(),
        }
    }

    /// Inherits features, settings and security from `parent`.
    #[must_use]
    pub fn derive_from(parent: &Self, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            security: parent.security.clone(),
            features: parent.features.clone(),
            settings: parent.settings.clone(),
        }
    }

    /// Merges feature declarations; these override inherited ones.
    #[must_use]
    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = self.features.merge(features);
        self
    }

    /// Merges setting declarations; these override inherited ones.
    #[must_use]
    pub fn with_settings(mut self, settings: &SettingsSchema) -> Self {
        self.settings = self.settings.add_settings(settings);
        self
    }

    /// Sets the security classification reported with results.
    #[must_use]
    pub fn with_security(mut self, security: impl Into<String>) -> Self {
        self.security = Some(security.into());
        self
    }

    /// Rejects descriptors with an empty name or version.
    ///
    /// # Errors
    ///
    /// [`PluginError::Descriptor`] describing the problem.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.name.trim().is_empty() {
            return Err(PluginError::Descriptor {
                message: String::from("plugin name must not be empty"),
            });
        }
        if self.version.trim().is_empty() {
            return Err(PluginError::Descriptor {
                message: format!("plugin '{}' must declare a version", self.name),
            });
        }
        Ok(())
    }

    /// Plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Security classification, if any.
    #[must_use]
    pub fn security(&self) -> Option<&str> {
        self.security.as_deref()
    }

    /// Declared features, base set included.
    #[must_use]
    pub const fn features(&self) -> &FeatureSchema {
        &self.features
    }

    /// Declared settings.
    #[must_use]
    pub const fn settings(&self) -> &SettingsSchema {
        &self.settings
    }
}

/// A secondary execution registered by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubExecution {
    /// Name appended to the plugin name.
    pub name: String,
    /// Version appended to the plugin version.
    pub version: String,
}

impl SubExecution {
    /// Declares a sub-execution.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Name and version under which an execution reports.
///
/// ```
/// use sift_plugins::{ExecutionIdentity, PluginDescriptor, SubExecution};
///
/// let descriptor = PluginDescriptor::new("Multi", "1.0");
/// let sub = SubExecution::new("Second", "0.3");
/// let identity = ExecutionIdentity::sub(&descriptor, &sub);
/// assert_eq!(identity.name, "Multi-Second");
/// assert_eq!(identity.version, "1.0-0.3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    /// Reported name.
    pub name: String,
    /// Reported version.
    pub version: String,
    /// Security classification inherited from the plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
}

impl ExecutionIdentity {
    /// Identity of the main execution.
    #[must_use]
    pub fn main(descriptor: &PluginDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            security: descriptor.security.clone(),
        }
    }

    /// Identity of a sub-execution.
    #[must_use]
    pub fn sub(descriptor: &PluginDescriptor, sub: &SubExecution) -> Self {
        Self {
            name: format!("{}-{}", descriptor.name, sub.name),
            version: format!("{}-{}", descriptor.version, sub.version),
            security: descriptor.security.clone(),
        }
    }
}

/// Analysis code run against jobs.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// between the supervising loop and its helpers.
pub trait Plugin: Send + Sync {
    /// Identity and declarations.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Whether the plugin can accept work right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Runs the main execution.
    ///
    /// # Errors
    ///
    /// Any [`JobError`]; it becomes the job's terminal state.
    fn execute(&self, job: &mut Job) -> ExecuteResult;

    /// Secondary executions run after the main one, each in isolation.
    fn sub_executions(&self) -> &[SubExecution] {
        &[]
    }

    /// Runs the named sub-execution.
    ///
    /// # Errors
    ///
    /// [`JobError::UnknownSubExecution`] unless overridden.
    fn execute_sub(&self, name: &str, job: &mut Job) -> ExecuteResult {
        let _ = job;
        Err(JobError::UnknownSubExecution {
            name: name.to_owned(),
        })
    }
}

/// Identity of the execution selected by `sub`.
///
/// # Errors
///
/// [`JobError::UnknownSubExecution`] when `sub` is not registered.
pub fn identity_of(plugin: &dyn Plugin, sub: Option<&str>) -> Result<ExecutionIdentity, JobError> {
    let descriptor = plugin.descriptor();
    let Some(name) = sub else {
        return Ok(ExecutionIdentity::main(descriptor));
    };
    plugin
        .sub_executions()
        .iter()
        .find(|candidate| candidate.name == name)
        .map(|found| ExecutionIdentity::sub(descriptor, found))
        .ok_or_else(|| JobError::UnknownSubExecution {
            name: name.to_owned(),
        })
}

/// Runs one execution of `plugin` in the current process.
///
/// `sub` selects a sub-execution; `None` runs the main execution. Setting
/// overrides that do not match the declarations yield `ERROR_INPUT` without
/// invoking the plugin.
#[must_use]
pub fn execute_request(plugin: &dyn Plugin, sub: Option<&str>, request: JobRequest) -> JobResult {
    let identity = match identity_of(plugin, sub) {
        Ok(identity) => identity,
        Err(err) => return JobResult::empty(err.to_state()),
    };
    let descriptor = plugin.descriptor();
    let settings = match descriptor.settings().resolve(&request.settings) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(
                target: EXECUTE_TARGET,
                plugin = identity.name.as_str(),
                job = request.id.as_str(),
                error = %err,
                "rejected setting overrides"
            );
            return JobResult::empty(State::with_failure(
                StateLabel::ErrorInput,
                INVALID_SETTINGS,
                err.to_string(),
            ));
        }
    };

    debug!(
        target: EXECUTE_TARGET,
        plugin = identity.name.as_str(),
        job = request.id.as_str(),
        "executing plugin"
    );
    let mut job = Job::new(request, descriptor.features().clone(), settings);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match sub {
        None => plugin.execute(&mut job),
        Some(name) => plugin.execute_sub(name, &mut job),
    }));
    let result = match outcome {
        Ok(outcome) => finish(job, outcome),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                target: EXECUTE_TARGET,
                plugin = identity.name.as_str(),
                message = message.as_str(),
                "plugin panicked"
            );
            JobResult::empty(State::with_failure(
                StateLabel::ErrorException,
                PANIC_FAILURE,
                message,
            ))
        }
    };
    debug!(
        target: EXECUTE_TARGET,
        plugin = identity.name.as_str(),
        state = %result.state.label(),
        events = result.events.len(),
        "plugin finished"
    );
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("plugin panicked"))
}
