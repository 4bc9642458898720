//! Observable state of the retrieval pipeline.

use crate::storage::StoreKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Where initialization currently is.
///
/// ```text
/// Uninitialized → CacheCheck ─┬→ CacheHit → BackendAttach ──────────────────────────→ Ready
///                             └→ CacheMiss → Scanning → Loading → Chunking → Embedding → Persisting → Ready
/// ```
///
/// `Failed` is terminal for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelinePhase {
    Uninitialized,
    CacheCheck,
    CacheHit,
    BackendAttach,
    CacheMiss,
    Scanning,
    Loading,
    Chunking,
    Embedding,
    Persisting,
    Ready,
    Failed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Uninitialized => "uninitialized",
            PipelinePhase::CacheCheck => "cache-check",
            PipelinePhase::CacheHit => "cache-hit",
            PipelinePhase::BackendAttach => "backend-attach",
            PipelinePhase::CacheMiss => "cache-miss",
            PipelinePhase::Scanning => "scanning",
            PipelinePhase::Loading => "loading",
            PipelinePhase::Chunking => "chunking",
            PipelinePhase::Embedding => "embedding",
            PipelinePhase::Persisting => "persisting",
            PipelinePhase::Ready => "ready",
            PipelinePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the pipeline, safe to read while initialization runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub phase: PipelinePhase,
    /// Store holding the index, once selected
    pub backend: Option<StoreKind>,
    /// A persistent backend was configured but unreachable
    pub degraded: bool,
    pub cache_hit: Option<bool>,
    pub files_scanned: usize,
    pub files_loaded: usize,
    pub skipped_files: Vec<String>,
    pub chunks_indexed: usize,
    pub chunks_embedded: usize,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            phase: PipelinePhase::Uninitialized,
            backend: None,
            degraded: false,
            cache_hit: None,
            files_scanned: 0,
            files_loaded: 0,
            skipped_files: Vec::new(),
            chunks_indexed: 0,
            chunks_embedded: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

impl PipelineStatus {
    pub fn is_ready(&self) -> bool {
        self.phase == PipelinePhase::Ready
    }

    /// Human-readable multi-line summary for terminals.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Phase: {}", self.phase)];
        if let Some(backend) = self.backend {
            let suffix = if self.degraded { " (degraded)" } else { "" };
            lines.push(format!("Backend: {backend}{suffix}"));
        }
        if let Some(hit) = self.cache_hit {
            lines.push(format!("Cache: {}", if hit { "hit" } else { "miss" }));
        }
        lines.push(format!("Files scanned: {}", self.files_scanned));
        lines.push(format!("Files loaded: {}", self.files_loaded));
        if !self.skipped_files.is_empty() {
            lines.push(format!("Files skipped: {}", self.skipped_files.len()));
            for path in self.skipped_files.iter().take(10) {
                lines.push(format!("  {path}"));
            }
        }
        lines.push(format!("Chunks indexed: {}", self.chunks_indexed));
        if let Some(error) = &self.error {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}
