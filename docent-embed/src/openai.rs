//! HTTP providers for OpenAI-compatible and Azure OpenAI APIs

use crate::config::{ApiFlavor, ProviderConfig};
use crate::error::{EmbedError, GenerateError, Result};
use crate::provider::{DEFAULT_ANSWER_TEMPLATE, Embedder, Generator, render_answer_prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn build_client(timeout_secs: u64) -> std::result::Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

fn authorize(
    request: reqwest::RequestBuilder,
    flavor: ApiFlavor,
    api_key: &str,
) -> reqwest::RequestBuilder {
    match flavor {
        ApiFlavor::Azure => request.header("api-key", api_key),
        ApiFlavor::OpenAi => request.bearer_auth(api_key),
    }
}

/// Parse an embeddings response body into vectors ordered like the input.
fn parse_embeddings(body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if body.data.len() != expected {
        return Err(EmbedError::invalid_response(format!(
            "expected {} embeddings, got {}",
            expected,
            body.data.len()
        )));
    }

    let mut data = body.data;
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// Embedding provider backed by an OpenAI-compatible or Azure OpenAI endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    config: ProviderConfig,
    api_key: String,
    url: String,
}

impl OpenAiEmbedder {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config
            .resolve_api_key()
            .map_err(|var| EmbedError::MissingApiKey { var })?;
        let client = build_client(config.timeout_secs)?;
        let url = config.embeddings_url();

        Ok(Self {
            client,
            config,
            api_key,
            url,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Requesting {} embeddings from {}",
            texts.len(),
            self.config.embedding_model
        );

        let model = match self.config.flavor {
            ApiFlavor::OpenAi => Some(self.config.embedding_model.as_str()),
            ApiFlavor::Azure => None,
        };
        let request = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                model,
                input: texts,
            });

        let response = authorize(request, self.config.flavor, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::invalid_response(e.to_string()))?;
        let vectors = parse_embeddings(body, texts.len())?;

        if let Some(bad) = vectors
            .iter()
            .find(|v| v.len() != self.config.embedding_dimension)
        {
            return Err(EmbedError::invalid_response(format!(
                "expected dimension {}, got {}",
                self.config.embedding_dimension,
                bad.len()
            )));
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    fn name(&self) -> &str {
        &self.config.embedding_model
    }
}

/// Chat-completion provider that answers from retrieved context.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: ProviderConfig,
    api_key: String,
    url: String,
    template: String,
}

impl OpenAiGenerator {
    pub fn new(config: ProviderConfig) -> std::result::Result<Self, GenerateError> {
        config
            .validate()
            .map_err(|e| GenerateError::InvalidConfig {
                message: e.to_string(),
            })?;
        let api_key = config
            .resolve_api_key()
            .map_err(|var| GenerateError::MissingApiKey { var })?;
        let client = build_client(config.timeout_secs)?;
        let url = config.chat_url();

        Ok(Self {
            client,
            config,
            api_key,
            url,
            template: DEFAULT_ANSWER_TEMPLATE.to_string(),
        })
    }

    /// Replace the answer template; it must contain `{context}` and `{input}`.
    pub fn with_template(self, template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..self
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn complete(
        &self,
        context: &str,
        question: &str,
    ) -> std::result::Result<String, GenerateError> {
        let prompt = render_answer_prompt(&self.template, context, question);
        let model = match self.config.flavor {
            ApiFlavor::OpenAi => Some(self.config.chat_model.as_str()),
            ApiFlavor::Azure => None,
        };

        let request = self.client.post(&self.url).json(&ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        });

        let response = authorize(request, self.config.flavor, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::invalid_response(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerateError::invalid_response("completion has no content"))
    }

    fn name(&self) -> &str {
        &self.config.chat_model
    }
}
