//! Plugin execution model for sift.
//!
//! The `sift-plugins` crate defines what a plugin is and how its output
//! becomes a result. Plugins implement [`Plugin`] and declare their features
//! and settings through a [`PluginDescriptor`]. Each execution receives a
//! fresh [`Job`] through which it emits typed feature values, declares child
//! and grandchild entities, and attaches content. Once the plugin returns,
//! the [`assemble`]r turns the job into a [`JobResult`]: a terminal [`State`],
//! events in pre-order with full parent chains, and deduplicated content.
//!
//! Everything here runs in-process. Isolation, memory limits and the job
//! loop live in `siftd`.
//!
//! # Example
//!
//! ```
//! use sift_plugins::{
//!     ExecuteResult, Feature, Job, JobRequest, Plugin, PluginDescriptor, StateLabel,
//!     execute_request, relationship,
//! };
//!
//! struct Unpacker(PluginDescriptor);
//!
//! impl Plugin for Unpacker {
//!     fn descriptor(&self) -> &PluginDescriptor {
//!         &self.0
//!     }
//!
//!     fn execute(&self, job: &mut Job) -> ExecuteResult {
//!         let mut child = job.add_child_with_data(relationship([("action", "extracted")]), "inner")?;
//!         child.add_feature_values("filename", ["inner.txt"])?;
//!         Ok(None)
//!     }
//! }
//!
//! let plugin = Unpacker(
//!     PluginDescriptor::new("Unpacker", "1.0")
//!         .with_features(vec![Feature::unspecified("tag", "extra tag")]),
//! );
//! let result = execute_request(&plugin, None, JobRequest::new("job-1", "outer"));
//! assert_eq!(result.state.label(), StateLabel::Completed);
//! assert_eq!(result.events.len(), 1);
//! ```

pub mod assembler;
pub mod content;
pub mod error;
pub mod feature;
pub mod job;
pub mod plugin;
pub mod registry;
pub mod state;

#[cfg(test)]
mod tests;

pub use self::assembler::{
    Event, EventData, EventParent, ExecuteResult, JobResult, assemble, finish,
};
pub use self::content::{Content, ContentStore, DataLabel, DataMetadata, content_id};
pub use self::error::{INVALID_OUTPUT, JobError, PluginError};
pub use self::feature::{Feature, FeatureKind, FeatureSchema, FeatureValue, Value};
pub use self::job::{
    Entity, EntityId, InputData, Job, JobRequest, Relationship, relationship,
};
pub use self::plugin::{
    ExecutionIdentity, Plugin, PluginDescriptor, ResolvedSettings, SettingSpec,
    SettingsSchema, SubExecution, execute_request, identity_of,
};
pub use self::registry::PluginRegistry;
pub use self::state::{State, StateLabel};
