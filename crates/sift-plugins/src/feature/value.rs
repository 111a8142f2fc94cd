//! Typed feature values.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::FeatureKind;

/// A single feature value.
///
/// Ordering is total so that feature collections can be sorted and
/// deduplicated deterministically: values compare by variant first, then by
/// content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Free text.
    String(String),
    /// Signed integer.
    Integer(i64),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Point in time.
    Datetime(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    /// Filesystem path. Normalised to [`Value::Uri`] during validation.
    Filepath(String),
    /// URI or path in the legacy shared representation.
    Uri(String),
}

impl Value {
    /// Builds a filepath value.
    #[must_use]
    pub fn filepath(path: impl Into<String>) -> Self {
        Self::Filepath(path.into())
    }

    /// Builds a URI value.
    #[must_use]
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    /// Kind carried by this value.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        match self {
            Self::String(_) => FeatureKind::String,
            Self::Integer(_) => FeatureKind::Integer,
            Self::Binary(_) => FeatureKind::Binary,
            Self::Datetime(_) => FeatureKind::Datetime,
            Self::Filepath(_) => FeatureKind::Filepath,
            Self::Uri(_) => FeatureKind::Uri,
        }
    }

    /// `true` for text, paths and bytes of zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(text) | Self::Filepath(text) | Self::Uri(text) => text.is_empty(),
            Self::Binary(bytes) => bytes.is_empty(),
            Self::Integer(_) | Self::Datetime(_) => false,
        }
    }

    /// Folds filepaths into the URI representation.
    #[must_use]
    pub(crate) fn into_legacy(self) -> Self {
        match self {
            Self::Filepath(path) => Self::Uri(path),
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(text) | Self::Filepath(text) | Self::Uri(text) => f.write_str(text),
            Self::Integer(number) => write!(f, "{number}"),
            Self::Binary(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Self::Datetime(moment) => match moment.format(&Rfc3339) {
                Ok(text) => f.write_str(&text),
                Err(_) => write!(f, "{moment}"),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Self::Integer(number)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Integer(i64::from(number))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

impl From<OffsetDateTime> for Value {
    fn from(moment: OffsetDateTime) -> Self {
        Self::Datetime(moment)
    }
}

/// A value plus an optional label qualifying it.
///
/// # Example
///
/// ```
/// use sift_plugins::{FeatureValue, Value};
///
/// let value = FeatureValue::labelled("a", "section");
/// assert_eq!(value.value(), &Value::String("a".into()));
/// assert_eq!(value.label(), Some("section"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureValue {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl FeatureValue {
    /// An unlabelled value.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            label: None,
        }
    }

    /// A labelled value.
    #[must_use]
    pub fn labelled(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: Some(label.into()),
        }
    }

    /// The typed value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// The optional label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn into_legacy(self) -> Self {
        Self {
            value: self.value.into_legacy(),
            label: self.label,
        }
    }
}

macro_rules! feature_value_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for FeatureValue {
                fn from(value: $source) -> Self {
                    Self::new(value)
                }
            }
        )*
    };
}

feature_value_from!(Value, &str, String, i64, i32, Vec<u8>, &[u8], OffsetDateTime);
