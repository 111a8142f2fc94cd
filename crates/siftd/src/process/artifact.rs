//! Result artefacts exchanged between an execution unit and its supervisor.
//!
//! The unit writes its [`JobResult`] to a temporary sibling and renames it
//! into place, so the supervisor never observes a partial file. The
//! supervisor reads the artefact once and deletes it.
//!
//! Layout:
//!
//! ```text
//! MAGIC (8 bytes) | header length (u32, big endian) | JSON header | blobs
//! ```
//!
//! The header holds the state, the events and an index of `(id, length)`
//! pairs; blob bytes follow in index order.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use sift_plugins::{Event, JobResult, State};

use super::{PROCESS_TARGET, process_alive};

const MAGIC: &[u8; 8] = b"SIFTRES1";
const PREFIX: &str = "sift-";
const SUFFIX: &str = "-result";
const TMP_EXTENSION: &str = "tmp";

static ARTIFACT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors raised while exchanging result artefacts.
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    /// No artefact exists at the expected path.
    #[error("result artefact '{}' is missing", path.display())]
    Missing {
        /// Expected location.
        path: PathBuf,
    },
    /// Reading, writing or renaming failed.
    #[error("result artefact I/O failed for '{}': {source}", path.display())]
    Io {
        /// Artefact path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The file does not start with the expected magic bytes.
    #[error("'{}' is not a result artefact", path.display())]
    BadMagic {
        /// Artefact path.
        path: PathBuf,
    },
    /// The header could not be encoded or decoded.
    #[error("result artefact header in '{}' is invalid: {message}", path.display())]
    Header {
        /// Artefact path.
        path: PathBuf,
        /// Serialiser message.
        message: String,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::Missing {
                path: path.to_path_buf(),
            };
        }
        Self::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobEntry {
    id: String,
    len: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    state: State,
    events: Vec<Event>,
    blobs: Vec<BlobEntry>,
}

/// A fresh artefact path in `dir`, unique within this supervisor process.
#[must_use]
pub fn next_artifact_path(dir: &Path) -> PathBuf {
    let counter = ARTIFACT_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("{PREFIX}{}-{counter}{SUFFIX}", std::process::id()))
}

/// The temporary sibling an execution unit writes before renaming it to
/// `path`.
#[must_use]
pub fn temporary_path(path: &Path) -> PathBuf {
    path.with_extension(TMP_EXTENSION)
}

/// Writes `result` to `path` through a temporary sibling.
///
/// # Errors
///
/// [`ArtifactError::Io`] or [`ArtifactError::Header`].
pub fn write_artifact(path: &Path, result: &JobResult) -> Result<(), ArtifactError> {
    let header = Header {
        state: result.state.clone(),
        events: result.events.clone(),
        blobs: result
            .data
            .iter()
            .map(|(id, bytes)| BlobEntry {
                id: id.clone(),
                len: bytes.len() as u64,
            })
            .collect(),
    };
    let encoded = serde_json::to_vec(&header).map_err(|err| ArtifactError::Header {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let header_len = u32::try_from(encoded.len()).map_err(|_| ArtifactError::Header {
        path: path.to_path_buf(),
        message: format!("header of {} bytes does not fit the length prefix", encoded.len()),
    })?;

    let tmp = temporary_path(path);
    let write = || -> io::Result<()> {
        let mut out = BufWriter::new(File::create(&tmp)?);
        out.write_all(MAGIC)?;
        out.write_all(&header_len.to_be_bytes())?;
        out.write_all(&encoded)?;
        for bytes in result.data.values() {
            out.write_all(bytes)?;
        }
        out.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()
    };
    write().map_err(|source| ArtifactError::io(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| ArtifactError::io(path, source))
}

/// Reads the artefact at `path` and deletes it.
///
/// # Errors
///
/// [`ArtifactError::Missing`] when nothing was written, otherwise
/// [`ArtifactError::Io`], [`ArtifactError::BadMagic`] or
/// [`ArtifactError::Header`].
pub fn read_artifact(path: &Path) -> Result<JobResult, ArtifactError> {
    let file = File::open(path).map_err(|source| ArtifactError::io(path, source))?;
    let result = decode(path, BufReader::new(file));
    if let Err(error) = fs::remove_file(path) {
        warn!(
            target: PROCESS_TARGET,
            path = %path.display(),
            %error,
            "failed to delete result artefact"
        );
    }
    result
}

fn decode(path: &Path, mut input: impl Read) -> Result<JobResult, ArtifactError> {
    let io_err = |source| ArtifactError::io(path, source);
    let mut magic = [0_u8; 8];
    input.read_exact(&mut magic).map_err(io_err)?;
    if &magic != MAGIC {
        return Err(ArtifactError::BadMagic {
            path: path.to_path_buf(),
        });
    }
    let mut len = [0_u8; 4];
    input.read_exact(&mut len).map_err(io_err)?;
    let mut encoded = vec![0_u8; u32::from_be_bytes(len) as usize];
    input.read_exact(&mut encoded).map_err(io_err)?;
    let header: Header = serde_json::from_slice(&encoded).map_err(|err| ArtifactError::Header {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let mut data = BTreeMap::new();
    for entry in header.blobs {
        let len = usize::try_from(entry.len).map_err(|_| ArtifactError::Header {
            path: path.to_path_buf(),
            message: format!("blob '{}' is too large", entry.id),
        })?;
        let mut bytes = vec![0_u8; len];
        input.read_exact(&mut bytes).map_err(io_err)?;
        data.insert(entry.id, bytes);
    }
    Ok(JobResult {
        state: header.state,
        events: header.events,
        data,
    })
}

/// Supervisor pid encoded in an artefact file name.
fn owner_pid(name: &str) -> Option<i32> {
    let stem = name.strip_suffix(".tmp").unwrap_or(name);
    let body = stem.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    let (pid, counter) = body.split_once('-')?;
    counter.parse::<u64>().ok()?;
    pid.parse().ok()
}

/// Deletes artefacts in `dir` whose supervisor is no longer running.
///
/// Returns the number of files removed.
///
/// # Errors
///
/// [`ArtifactError::Io`] when `dir` cannot be listed.
pub fn cleanup_stale_artifacts(dir: &Path) -> Result<usize, ArtifactError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(ArtifactError::io(dir, source)),
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(owner_pid) else {
            continue;
        };
        if process_alive(pid) {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(
                    target: PROCESS_TARGET,
                    path = %path.display(),
                    pid,
                    "removed stale result artefact"
                );
                removed += 1;
            }
            Err(error) => warn!(
                target: PROCESS_TARGET,
                path = %path.display(),
                %error,
                "failed to remove stale result artefact"
            ),
        }
    }
    Ok(removed)
}
