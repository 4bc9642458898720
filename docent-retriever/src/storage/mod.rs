//! Vector storage abstraction for docent-retriever
//!
//! Embedded chunks live in a [`VectorStore`]. Two implementations exist: the
//! process-local [`InMemoryStore`] and the network-attached [`QdrantStore`]
//! that survives restarts. Persistent stores are obtained from a
//! [`VectorBackend`], whose `attach` reports an unreachable service as an
//! explicit [`StoreError::Unavailable`] instead of a half-built handle.
//!
//! ## Architecture
//!
//! ```text
//! VectorBackend::attach ─┬─ Ok(Attachment) ────────────── QdrantStore
//!                        └─ Err(Unavailable) ─ fallback ── InMemoryStore
//! ```
//!
//! [`select_store`] is the single place where that policy is decided.

use async_trait::async_trait;
use docent_context::DocumentChunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub mod memory_store;
pub mod qdrant_store;

pub use memory_store::InMemoryStore;
pub use qdrant_store::{QdrantBackend, QdrantStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend cannot be reached (connection refused, timeout, gateway errors)
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    /// The backend was reached but the operation failed
    #[error("backend error: {message}")]
    Backend { message: String },

    /// The caller passed inconsistent data
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    InMemory,
    Persistent,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::InMemory => write!(f, "in-memory"),
            StoreKind::Persistent => write!(f, "persistent"),
        }
    }
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A search hit; higher scores are more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Search hits in descending score order, ties in insertion order.
pub type RetrievalResult = Vec<ScoredChunk>;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add chunks with their vectors; `chunks` and `vectors` pair up by index.
    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<(), StoreError>;

    /// The `k` entries most similar to `query`. Fewer when the store holds fewer.
    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult, StoreError>;

    async fn is_available(&self) -> bool;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), StoreError>;

    fn kind(&self) -> StoreKind;
}

/// A persistent store handle plus what it already holds.
pub struct Attachment {
    pub store: Arc<dyn VectorStore>,
    pub existing_points: usize,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("kind", &self.store.kind())
            .field("existing_points", &self.existing_points)
            .finish()
    }
}

/// Connects to a persistent vector service.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Attach to `collection`, creating nothing yet.
    async fn attach(&self, collection: &str) -> Result<Attachment, StoreError>;

    fn name(&self) -> &str;
}

/// The store chosen for this process.
pub struct StoreSelection {
    pub store: Arc<dyn VectorStore>,
    /// Points already present in a persistent collection
    pub existing_points: usize,
    /// A persistent backend was configured but could not be reached
    pub degraded: bool,
}

/// Pick the vector store for this process.
///
/// - no persistent backend configured: in-memory, not degraded
/// - attach succeeds: the persistent store
/// - backend unavailable: in-memory, degraded, with a warning
/// - any other backend error: returned to the caller
pub async fn select_store(
    backend: Option<&dyn VectorBackend>,
    collection: &str,
) -> Result<StoreSelection, StoreError> {
    let Some(backend) = backend else {
        info!("No persistent vector backend configured; using in-memory store");
        return Ok(StoreSelection {
            store: Arc::new(InMemoryStore::new()),
            existing_points: 0,
            degraded: false,
        });
    };

    match backend.attach(collection).await {
        Ok(attachment) => {
            info!(
                "Attached to {} collection '{}' ({} existing points)",
                backend.name(),
                collection,
                attachment.existing_points
            );
            Ok(StoreSelection {
                store: attachment.store,
                existing_points: attachment.existing_points,
                degraded: false,
            })
        }
        Err(StoreError::Unavailable { message }) => {
            warn!(
                "Persistent vector backend {} unavailable ({}); degraded mode: falling back to in-memory store",
                backend.name(),
                message
            );
            Ok(StoreSelection {
                store: Arc::new(InMemoryStore::new()),
                existing_points: 0,
                degraded: true,
            })
        }
        Err(e) => Err(e),
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub(crate) fn check_pairing(chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<(), StoreError> {
    if chunks.len() != vectors.len() {
        return Err(StoreError::invalid_input(format!(
            "{} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }
    Ok(())
}
