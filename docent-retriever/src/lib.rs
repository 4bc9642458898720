//! docent-retriever: document ingestion, caching and conversational retrieval
//!
//! This crate turns a directory of text, Markdown and PDF files into a
//! searchable vector index and answers questions over it. The index is built
//! lazily on first use, reused across restarts when the corpus is unchanged
//! and a persistent vector backend is reachable, and rebuilt in memory when
//! that backend is down.
//!
//! ## Key Modules
//!
//! - **[`corpus`]**: file discovery, fingerprints and text extraction
//! - **[`cache`]**: the manifest that decides whether a stored index is current
//! - **[`storage`]**: vector stores (in-memory and Qdrant) and backend selection
//! - **[`retrieval`]**: the indexing pipeline and the answer service
//! - **[`status`]**: observable pipeline progress
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docent_embed::{OpenAiEmbedder, OpenAiGenerator, ProviderConfig};
//! use docent_retriever::retrieval::{AnswerRequest, AnswerService, PipelineConfig, RetrievalPipeline};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = ProviderConfig::azure("https://my-resource.openai.azure.com");
//! let embedder = Arc::new(OpenAiEmbedder::new(provider.clone())?);
//! let generator = Arc::new(OpenAiGenerator::new(provider)?);
//!
//! let pipeline = RetrievalPipeline::new(PipelineConfig::new("./docs"), embedder, None)?;
//! let service = AnswerService::new(Arc::new(pipeline), generator);
//!
//! let response = service.answer(&AnswerRequest::new("Are cats mammals?")).await;
//! println!("{}", response.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Scanner → Loader → Chunking → Embeddings → VectorStore
//!                      ↑                                  ↓
//!            CacheManifest ← RetrievalPipeline ← AnswerService ← question
//! ```

pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod retrieval;
pub mod status;
pub mod storage;

pub use config::DocentConfig;
pub use error::{Result, RetrieverError};
