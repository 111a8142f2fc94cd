//! Feature declarations, schema inheritance and value validation.
//!
//! A plugin declares the features it may emit as a list of [`Feature`]s.
//! Declarations are inherited through [`FeatureSchema::merge`]: a later
//! declaration replaces a same-named earlier one in place, anything else is
//! appended. Every schema starts from the built-in [`BASE_FEATURES`].

mod value;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::JobError;

pub use self::value::{FeatureValue, Value};

/// Expected kind of a feature's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// Free text.
    String,
    /// Signed integer.
    Integer,
    /// Raw bytes.
    Binary,
    /// Point in time.
    Datetime,
    /// Filesystem path (legacy: stored as a URI).
    Filepath,
    /// URI.
    Uri,
    /// Any of the other kinds.
    #[default]
    Unspecified,
}

impl FeatureKind {
    /// Returns `true` when `value` may be stored under this kind.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Unspecified, _)
            | (Self::String, Value::String(_))
            | (Self::Integer, Value::Integer(_))
            | (Self::Binary, Value::Binary(_))
            | (Self::Datetime, Value::Datetime(_))
            | (Self::Filepath | Self::Uri, Value::Filepath(_) | Value::Uri(_)) => true,
            _ => false,
        }
    }
}

/// Name of the feature whose smallest value labels parent references.
pub const FILENAME_FEATURE: &str = "filename";

/// Declarations every plugin inherits.
pub const BASE_FEATURES: &[(&str, &str, FeatureKind)] = &[
    (FILENAME_FEATURE, "Name the entity was observed under", FeatureKind::String),
    ("file_format", "Identified format of the entity", FeatureKind::String),
    ("file_extension", "Extension implied by the format", FeatureKind::String),
    ("tag", "Free-form tag attached by the plugin", FeatureKind::String),
];

/// Declaration of one output field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    name: String,
    description: String,
    kind: FeatureKind,
}

impl Feature {
    /// Declares a feature of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
        }
    }

    /// Declares a feature accepting any kind.
    #[must_use]
    pub fn unspecified(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, FeatureKind::Unspecified)
    }

    /// Feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Declared kind.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        self.kind
    }
}

/// Ordered set of declarations, unique by name.
///
/// # Example
///
/// ```
/// use sift_plugins::{Feature, FeatureKind, FeatureSchema};
///
/// let parent = FeatureSchema::with_base(vec![
///     Feature::unspecified("example_unspec", "anything"),
/// ]);
/// let child = parent.merge(vec![
///     Feature::new("example_unspec", "now text", FeatureKind::String),
///     Feature::unspecified("descendant", "added by the child"),
/// ]);
/// assert_eq!(child.get("example_unspec").map(Feature::kind), Some(FeatureKind::String));
/// assert!(child.get("descendant").is_some());
/// assert!(child.get("filename").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    /// A schema holding only [`BASE_FEATURES`].
    #[must_use]
    pub fn base() -> Self {
        Self {
            features: BASE_FEATURES
                .iter()
                .map(|(name, description, kind)| Feature::new(*name, *description, *kind))
                .collect(),
        }
    }

    /// The base schema extended by `features`.
    #[must_use]
    pub fn with_base(features: Vec<Feature>) -> Self {
        Self::base().merge(features)
    }

    /// Returns a schema where `overrides` replace same-named declarations and
    /// extend the rest.
    #[must_use]
    pub fn merge(&self, overrides: Vec<Feature>) -> Self {
        let mut features = self.features.clone();
        for feature in overrides {
            match features.iter_mut().find(|existing| existing.name == feature.name) {
                Some(existing) => *existing = feature,
                None => features.push(feature),
            }
        }
        Self { features }
    }

    /// Looks up a declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|feature| feature.name == name)
    }

    /// Declarations in order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Validates one value for the named feature.
    ///
    /// Filepath values come back as URIs.
    ///
    /// # Errors
    ///
    /// [`JobError::UndeclaredFeature`] when `name` is not declared,
    /// [`JobError::TypeMismatch`] when the value's kind is not accepted.
    pub fn validate(&self, name: &str, value: FeatureValue) -> Result<FeatureValue, JobError> {
        let declaration = self.declaration(name)?;
        check_kind(declaration, &value)?;
        Ok(value.into_legacy())
    }

    /// Validates a batch of values for one feature.
    ///
    /// The batch is checked in full before anything is returned, so callers
    /// can apply it atomically.
    ///
    /// # Errors
    ///
    /// As [`FeatureSchema::validate`], for the first rejected value.
    pub fn validate_all(
        &self,
        name: &str,
        values: Vec<FeatureValue>,
    ) -> Result<Vec<FeatureValue>, JobError> {
        let declaration = self.declaration(name)?;
        for value in &values {
            check_kind(declaration, value)?;
        }
        Ok(values.into_iter().map(FeatureValue::into_legacy).collect())
    }

    fn declaration(&self, name: &str) -> Result<&Feature, JobError> {
        self.get(name).ok_or_else(|| JobError::UndeclaredFeature {
            names: vec![name.to_owned()],
        })
    }
}

fn check_kind(declaration: &Feature, value: &FeatureValue) -> Result<(), JobError> {
    if declaration.kind.accepts(value.value()) {
        return Ok(());
    }
    Err(JobError::TypeMismatch {
        feature: declaration.name.clone(),
        expected: declaration.kind,
        found: value.value().kind(),
    })
}

#[cfg(test)]
mod tests;
