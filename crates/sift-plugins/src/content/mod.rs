//! Content-addressed storage for data attached to entities.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::error::JobError;

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn content_id(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Closed vocabulary of attachment labels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataLabel {
    /// The entity's own bytes.
    Content,
    /// Extracted or decoded text.
    Text,
    /// Human-readable report.
    Report,
    /// Test fixture data.
    Test,
    /// Rendered image.
    Screenshot,
    /// Deobfuscated source.
    Deobfuscated,
    /// Captured traffic.
    NetworkCapture,
}

/// Optional qualifiers of an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMetadata {
    /// Language of textual content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// MIME type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl DataMetadata {
    /// Metadata carrying only a language.
    #[must_use]
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            mime: None,
        }
    }

    /// Metadata carrying only a MIME type.
    #[must_use]
    pub fn mime(mime: impl Into<String>) -> Self {
        Self {
            language: None,
            mime: Some(mime.into()),
        }
    }
}

/// Content supplied by plugin code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// A file read in full when the content is stored.
    File(PathBuf),
}

impl Content {
    /// Drains a reader into in-memory content.
    ///
    /// # Errors
    ///
    /// [`JobError::ContentRead`] when the reader fails.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, JobError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::Bytes(bytes))
    }

    /// Resolves the content to bytes.
    ///
    /// # Errors
    ///
    /// [`JobError::ContentRead`] when a file cannot be read.
    pub fn into_bytes(self) -> Result<Vec<u8>, JobError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::File(path) => {
                let mut bytes = Vec::new();
                File::open(&path)?.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Content {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<PathBuf> for Content {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Deduplicating map from content identifier to bytes.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl ContentStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the identifier of `content` without storing it.
    ///
    /// Returned bytes are handed back so the caller can commit them later
    /// with [`ContentStore::commit`].
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] for zero bytes, [`JobError::ContentRead`]
    /// when a file cannot be read.
    pub fn prepare(content: Content) -> Result<(String, Vec<u8>), JobError> {
        let bytes = content.into_bytes()?;
        if bytes.is_empty() {
            return Err(JobError::EmptyContent);
        }
        Ok((content_id(&bytes), bytes))
    }

    /// Stores bytes already identified by [`ContentStore::prepare`].
    pub fn commit(&mut self, id: String, bytes: Vec<u8>) {
        self.blobs.entry(id).or_insert(bytes);
    }

    /// Stores content and returns its identifier. Identical bytes are kept
    /// once.
    ///
    /// # Errors
    ///
    /// As [`ContentStore::prepare`].
    pub fn insert(&mut self, content: impl Into<Content>) -> Result<String, JobError> {
        let (id, bytes) = Self::prepare(content.into())?;
        self.commit(id.clone(), bytes);
        Ok(id)
    }

    /// Bytes stored under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.blobs.get(id).map(Vec::as_slice)
    }

    /// Number of distinct blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Consumes the store.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, Vec<u8>> {
        self.blobs
    }
}
