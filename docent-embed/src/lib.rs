//! # docent-embed
//!
//! Embedding and answer-generation providers for docent, behind two small
//! async traits so the retrieval pipeline never depends on a particular
//! vendor.
//!
//! ## Providers
//!
//! - [`OpenAiEmbedder`] / [`OpenAiGenerator`]: OpenAI-compatible servers and
//!   Azure OpenAI deployments over HTTP, selected by [`ApiFlavor`]
//! - `FastEmbedProvider`: local ONNX models, behind the `local-embeddings`
//!   cargo feature
//!
//! ## Quick Start
//!
//! ```no_run
//! use docent_embed::{Embedder, OpenAiEmbedder, ProviderConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProviderConfig::azure("https://my-resource.openai.azure.com");
//! let embedder = OpenAiEmbedder::new(config)?;
//!
//! let texts = vec!["Cats are mammals.".to_string()];
//! let vectors = embedder.embed(&texts).await?;
//! println!("{} vectors of dimension {}", vectors.len(), embedder.dimension());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Embedding calls return [`EmbedError`], completions return
//! [`GenerateError`]. Providers never retry; a failed call surfaces
//! immediately.

pub mod config;
pub mod error;
pub mod openai;
pub mod provider;

// Re-export main types for easy access
pub use config::{ApiFlavor, ProviderConfig};
pub use error::{EmbedError, GenerateError, Result};
pub use openai::{OpenAiEmbedder, OpenAiGenerator};
#[cfg(feature = "local-embeddings")]
pub use provider::FastEmbedProvider;
pub use provider::{DEFAULT_ANSWER_TEMPLATE, Embedder, Generator, render_answer_prompt};
