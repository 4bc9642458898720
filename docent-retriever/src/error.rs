//! Error taxonomy for ingestion, caching and retrieval

use crate::storage::StoreError;
use docent_context::SplitterError;
use docent_embed::{EmbedError, GenerateError};
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// File system access failed
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PDF text extraction failed
    #[error("Failed to extract text from PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },

    /// The persistent vector backend cannot be reached
    #[error("Vector backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// The persistent vector backend was reached but rejected the operation
    #[error("Vector backend error: {message}")]
    Backend { message: String },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerateError),

    /// The cache manifest exists but cannot be read or parsed
    #[error("Cache manifest {} is corrupt: {message}", path.display())]
    CacheCorrupt { path: PathBuf, message: String },

    /// Initialization failed earlier in this process; no retry until restart
    #[error("Retrieval pipeline failed to initialize: {message}")]
    PipelineFailed { message: String },

    /// The caller's request cannot be answered as posed
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Invalid chunking configuration: {0}")]
    Chunking(#[from] SplitterError),

    /// A blocking worker task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RetrieverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<StoreError> for RetrieverError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { message } => Self::BackendUnavailable { message },
            StoreError::Backend { message } => Self::Backend { message },
            StoreError::InvalidInput { message } => Self::Backend { message },
        }
    }
}
