//! Plugin setting declarations and per-job resolution.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::PluginError;

/// One declared setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSpec {
    default: JsonValue,
    description: String,
}

impl SettingSpec {
    /// Declares a setting with its default value.
    #[must_use]
    pub fn new(default: impl Into<JsonValue>, description: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            description: description.into(),
        }
    }

    /// Default value.
    #[must_use]
    pub const fn default_value(&self) -> &JsonValue {
        &self.default
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        match (&self.default, value) {
            (JsonValue::Null, _)
            | (JsonValue::Bool(_), JsonValue::Bool(_))
            | (JsonValue::String(_), JsonValue::String(_))
            | (JsonValue::Array(_), JsonValue::Array(_))
            | (JsonValue::Object(_), JsonValue::Object(_)) => true,
            (JsonValue::Number(default), JsonValue::Number(given)) => {
                default.is_f64() || !given.is_f64()
            }
            _ => false,
        }
    }
}

/// Declared settings of a plugin, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsSchema {
    entries: BTreeMap<String, SettingSpec>,
}

impl SettingsSchema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one declaration.
    #[must_use]
    pub fn with(
        mut self,
        name: impl Into<String>,
        default: impl Into<JsonValue>,
        description: impl Into<String>,
    ) -> Self {
        self.entries
            .insert(name.into(), SettingSpec::new(default, description));
        self
    }

    /// Merges `child` into a copy of this schema; child declarations win.
    #[must_use]
    pub fn add_settings(&self, child: &Self) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(
            child
                .entries
                .iter()
                .map(|(name, spec)| (name.clone(), spec.clone())),
        );
        Self { entries }
    }

    /// Looks up a declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SettingSpec> {
        self.entries.get(name)
    }

    /// Declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingSpec)> {
        self.entries
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// Applies per-job overrides on top of the defaults.
    ///
    /// An override must name a declared setting and share the JSON type of
    /// its default. Integer defaults reject fractional overrides; a `null`
    /// default accepts anything.
    ///
    /// # Errors
    ///
    /// [`PluginError::Setting`] for the first rejected override.
    pub fn resolve(&self, overrides: &Map<String, JsonValue>) -> Result<ResolvedSettings, PluginError> {
        let mut values: BTreeMap<String, JsonValue> = self
            .entries
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect();
        for (name, value) in overrides {
            let spec = self.entries.get(name).ok_or_else(|| PluginError::Setting {
                name: name.clone(),
                message: "setting is not declared".to_owned(),
            })?;
            if !spec.accepts(value) {
                return Err(PluginError::Setting {
                    name: name.clone(),
                    message: format!("expected a value like {}, got {value}", spec.default),
                });
            }
            values.insert(name.clone(), value.clone());
        }
        Ok(ResolvedSettings { values })
    }
}

/// Effective settings for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSettings {
    values: BTreeMap<String, JsonValue>,
}

impl ResolvedSettings {
    /// Raw value of a setting.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.get(name)
    }

    /// String setting.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(JsonValue::as_str)
    }

    /// Integer setting.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(JsonValue::as_i64)
    }

    /// Boolean setting.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(JsonValue::as_bool)
    }

    /// Deserialises a setting into `T`.
    ///
    /// # Errors
    ///
    /// [`PluginError::Setting`] when the setting is missing or has another
    /// shape.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, PluginError> {
        let value = self.get(name).ok_or_else(|| PluginError::Setting {
            name: name.to_owned(),
            message: "setting is not declared".to_owned(),
        })?;
        serde_json::from_value(value.clone()).map_err(|err| PluginError::Setting {
            name: name.to_owned(),
            message: err.to_string(),
        })
    }
}
