//! Durable record of which file states the persistent index was built from.
//!
//! The manifest maps each relative path to its fingerprint string. It is the
//! only cache state kept on disk; vectors live in the persistent backend.
//! Saving writes a sibling temporary file and renames it over the target, so
//! readers observe either the old or the new manifest.

use crate::corpus::{FingerprintMode, SourceFile, fingerprint_with};
use crate::error::{Result, RetrieverError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheManifest {
    entries: BTreeMap<String, String>,
}

impl CacheManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint every file of the corpus.
    pub async fn build(files: &[SourceFile], mode: FingerprintMode) -> Result<Self> {
        let mut manifest = Self::new();
        for file in files {
            let fp = fingerprint_with(&file.absolute_path, mode).await?;
            manifest.insert(file.relative_path.clone(), fp.to_string());
        }
        Ok(manifest)
    }

    pub fn insert(&mut self, relative_path: String, fingerprint: String) {
        self.entries.insert(relative_path, fingerprint);
    }

    pub fn get(&self, relative_path: &str) -> Option<&str> {
        self.entries.get(relative_path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read the manifest at `path`. A missing file is an empty manifest.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(RetrieverError::CacheCorrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| RetrieverError::CacheCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Whether the index described by this manifest still matches `files`.
    ///
    /// An empty manifest is never valid. Every current file needs a matching
    /// entry; a fingerprint that cannot be computed counts as a mismatch. With
    /// `detect_deletions`, entries for files that no longer exist also
    /// invalidate the manifest.
    pub async fn is_valid_for(
        &self,
        files: &[SourceFile],
        mode: FingerprintMode,
        detect_deletions: bool,
    ) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        for file in files {
            let Some(recorded) = self.get(&file.relative_path) else {
                debug!("Cache invalid: {} is new", file.relative_path);
                return false;
            };
            match fingerprint_with(&file.absolute_path, mode).await {
                Ok(current) if current.to_string() == recorded => {}
                Ok(_) => {
                    debug!("Cache invalid: {} changed", file.relative_path);
                    return false;
                }
                Err(e) => {
                    debug!("Cache invalid: cannot fingerprint {}: {}", file.relative_path, e);
                    return false;
                }
            }
        }

        if detect_deletions {
            let present: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
            if let Some(gone) = self.entries.keys().find(|k| !present.contains(k.as_str())) {
                debug!("Cache invalid: {} was removed", gone);
                return false;
            }
        }

        true
    }

    /// Atomically replace the manifest at `path`.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries).map_err(|e| {
            RetrieverError::io(path, std::io::Error::other(e))
        })?;
        let target = path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = match target.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => std::path::PathBuf::from("."),
            };
            let mut tmp =
                tempfile::NamedTempFile::new_in(&dir).map_err(|e| RetrieverError::io(&dir, e))?;
            tmp.write_all(&json)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| RetrieverError::io(tmp.path(), e))?;
            tmp.persist(&target)
                .map_err(|e| RetrieverError::io(&target, e.error))?;
            Ok(())
        })
        .await??;

        debug!("Saved cache manifest with {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Delete the manifest at `path`. A missing manifest is not an error.
    pub async fn remove(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Removed cache manifest {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RetrieverError::io(path, e)),
        }
    }
}
