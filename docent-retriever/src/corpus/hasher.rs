//! File fingerprints used to decide whether a cached index is still valid.
//!
//! The fast fingerprint reads metadata only: size plus modification time in
//! milliseconds. It misses edits that keep both unchanged; the content mode
//! hashes the file bytes with blake3 to close that gap at the cost of reading
//! every file on each cache check.

use crate::error::{Result, RetrieverError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// Size and modification time
    #[default]
    Fast,
    /// blake3 hash of the file contents
    Content,
}

/// Cheap identity of a file's state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at_ms: i64,
    /// Present only for [`FingerprintMode::Content`]
    pub content_hash: Option<blake3::Hash>,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content_hash {
            Some(hash) => write!(f, "blake3:{}", hash.to_hex()),
            None => write!(f, "{}:{}", self.size_bytes, self.modified_at_ms),
        }
    }
}

/// Fast fingerprint of `path`, reading metadata only.
pub async fn fingerprint(path: &Path) -> Result<Fingerprint> {
    fingerprint_with(path, FingerprintMode::Fast).await
}

/// Fingerprint of `path` at the requested strictness.
pub async fn fingerprint_with(path: &Path, mode: FingerprintMode) -> Result<Fingerprint> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| RetrieverError::io(path, e))?;
    let modified = metadata
        .modified()
        .map_err(|e| RetrieverError::io(path, e))?;
    let modified_at_ms = DateTime::<Utc>::from(modified).timestamp_millis();

    let content_hash = match mode {
        FingerprintMode::Fast => None,
        FingerprintMode::Content => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| RetrieverError::io(path, e))?;
            Some(blake3::hash(&bytes))
        }
    };

    Ok(Fingerprint {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        modified_at_ms,
        content_hash,
    })
}
