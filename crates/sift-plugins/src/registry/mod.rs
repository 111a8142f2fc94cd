//! Plugin registry for lookup by name.
//!
//! The [`PluginRegistry`] stores validated plugins keyed by descriptor name
//! and answers which plugins declare a given feature. Duplicate registrations
//! for the same plugin name are rejected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;
use crate::plugin::Plugin;

/// Registry of available plugins.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use sift_plugins::{ExecuteResult, Job, Plugin, PluginDescriptor, PluginRegistry};
///
/// struct Noop(PluginDescriptor);
///
/// impl Plugin for Noop {
///     fn descriptor(&self) -> &PluginDescriptor {
///         &self.0
///     }
///
///     fn execute(&self, _job: &mut Job) -> ExecuteResult {
///         Ok(None)
///     }
/// }
///
/// let mut registry = PluginRegistry::new();
/// registry
///     .register(Arc::new(Noop(PluginDescriptor::new("noop", "1.0"))))
///     .expect("registration succeeds");
/// assert!(registry.get("noop").is_some());
/// ```
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin after validating its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Descriptor`] if validation fails or
    /// [`PluginError::Duplicate`] if the name is taken.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        plugin.descriptor().validate()?;
        let name = plugin.descriptor().name().to_owned();
        if self.plugins.contains_key(&name) {
            return Err(PluginError::Duplicate { name });
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Looks up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Looks up a plugin that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] for unknown names.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        self.get(name).ok_or_else(|| PluginError::NotFound {
            name: name.to_owned(),
        })
    }

    /// Returns the plugins declaring `feature`, in name order.
    #[must_use]
    pub fn find_for_feature(&self, feature: &str) -> Vec<Arc<dyn Plugin>> {
        let mut found: Vec<_> = self
            .plugins
            .values()
            .filter(|plugin| plugin.descriptor().features().get(feature).is_some())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.descriptor().name().cmp(b.descriptor().name()));
        found
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
