//! Provider traits and the local embedding provider

use crate::error::{GenerateError, Result};
use async_trait::async_trait;

/// Prompt used to answer a question from retrieved context.
///
/// `{context}` receives the rendered chunks and `{input}` the (possibly
/// conversation-aware) question.
pub const DEFAULT_ANSWER_TEMPLATE: &str = "You are a helpful assistant with access to conversation history and relevant context. Use the context below to answer the user's question, and consider the conversation history to provide more relevant and contextual responses.

<context>
{context}
</context>

Question: {input}

Instructions:
- If the context is unrelated to the question, say \"I don't have information about that in my knowledge base.\"
- If the question refers to previous parts of the conversation, use that context to provide a more relevant answer.
- Be conversational and maintain context from the ongoing conversation.
- Each context may contain a 'Category' and 'Filename' to help you understand the source.";

/// Fill the `{context}` and `{input}` placeholders of an answer template.
pub fn render_answer_prompt(template: &str, context: &str, question: &str) -> String {
    // One pass over the template; substituted text is never rescanned.
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{input}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Turns texts into fixed-dimension vectors.
///
/// Implementations return exactly one vector per input, in input order, and
/// do not retry failed requests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for a batch of texts
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate the embedding of a single query text
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text.to_string()]).await?;
        vectors.into_iter().next().ok_or_else(|| {
            crate::error::EmbedError::invalid_response("no embedding generated for query")
        })
    }

    /// Get the dimension of embeddings produced by this provider
    fn dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn name(&self) -> &str;
}

/// Produces an answer from retrieved context and a question.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(
        &self,
        context: &str,
        question: &str,
    ) -> std::result::Result<String, GenerateError>;

    fn name(&self) -> &str;
}

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedProvider;

#[cfg(feature = "local-embeddings")]
mod local {
    use super::Embedder;
    use crate::error::{EmbedError, Result};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::{Arc, Mutex};

    /// FastEmbed-based embedding provider using local ONNX models
    #[derive(Clone)]
    pub struct FastEmbedProvider {
        model_name: String,
        model: Arc<Mutex<TextEmbedding>>,
        dimension: usize,
        batch_size: usize,
    }

    impl std::fmt::Debug for FastEmbedProvider {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FastEmbedProvider")
                .field("model_name", &self.model_name)
                .field("dimension", &self.dimension)
                .field("batch_size", &self.batch_size)
                .finish()
        }
    }

    fn model_for_name(name: &str) -> Result<EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
            other => Err(EmbedError::invalid_config(format!(
                "unknown local embedding model: {other}"
            ))),
        }
    }

    impl FastEmbedProvider {
        /// Downloads (on first use) and loads the named model.
        pub async fn create(model_name: &str, batch_size: usize) -> Result<Self> {
            let model_id = model_for_name(model_name)?;
            tracing::info!("Initializing FastEmbed provider for model: {}", model_name);

            let (model, dimension) =
                tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                    let init_options = InitOptions::new(model_id).with_show_download_progress(true);
                    let mut model =
                        TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                    // Probe the dimension with a test embedding
                    let probe = model
                        .embed(vec!["test".to_string()], None)
                        .map_err(EmbedError::model_init)?;
                    let dimension = probe.first().map(|emb| emb.len()).unwrap_or(0);
                    Ok((model, dimension))
                })
                .await??;

            if dimension == 0 {
                return Err(EmbedError::invalid_response(
                    "local model produced an empty embedding",
                ));
            }

            tracing::info!("Model loaded successfully. Dimension: {}", dimension);
            Ok(Self {
                model_name: model_name.to_string(),
                model: Arc::new(Mutex::new(model)),
                dimension,
                batch_size: batch_size.max(1),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            tracing::debug!("Generating local embeddings for {} texts", texts.len());
            let texts = texts.to_vec();
            let model = Arc::clone(&self.model);
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard
                    .embed(texts, Some(batch_size))
                    .map_err(EmbedError::embedding_gen)
            })
            .await?
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "fastembed"
        }
    }

}
