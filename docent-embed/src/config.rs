//! Configuration for embedding and completion providers

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};

/// Which wire dialect the remote provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// Azure OpenAI: deployment-scoped URLs, `api-key` header, `api-version` query.
    #[default]
    Azure,
    /// OpenAI-compatible: `{base_url}/embeddings`, bearer token, model in the body.
    OpenAi,
}

impl ApiFlavor {
    /// Environment variable consulted for the API key when none is configured.
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            ApiFlavor::Azure => "AZURE_OPENAI_API_KEY",
            ApiFlavor::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Settings shared by [`OpenAiEmbedder`](crate::openai::OpenAiEmbedder) and
/// [`OpenAiGenerator`](crate::openai::OpenAiGenerator).
///
/// For the Azure flavor, `embedding_model` and `chat_model` name the
/// *deployments*; for the OpenAI flavor they are model ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub flavor: ApiFlavor,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: Option<String>,
    /// Azure `api-version` query parameter
    pub api_version: String,
    pub embedding_model: String,
    /// Dimension of vectors returned by `embedding_model`
    pub embedding_dimension: usize,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Overrides the flavor's default API key variable
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    /// Name of a local ONNX model; used instead of the remote embedding API
    /// when the `local-embeddings` feature is enabled.
    pub local_model: Option<String>,
    /// Explicit key, never read from or written to configuration files.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            flavor: ApiFlavor::Azure,
            base_url: "https://api.openai.com/v1".to_string(),
            endpoint: None,
            api_version: "2024-02-01".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimension: 1536,
            chat_model: "gpt-4o".to_string(),
            temperature: 1.0,
            max_tokens: None,
            api_key_env: None,
            timeout_secs: 60,
            local_model: None,
            api_key: None,
        }
    }
}

impl ProviderConfig {
    /// Configuration for an OpenAI-compatible API at `base_url`.
    pub fn openai(base_url: impl Into<String>) -> Self {
        Self {
            flavor: ApiFlavor::OpenAi,
            base_url: base_url.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            ..Self::default()
        }
    }

    /// Configuration for an Azure OpenAI resource.
    pub fn azure(endpoint: impl Into<String>) -> Self {
        Self {
            flavor: ApiFlavor::Azure,
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Set the embedding model or deployment (builder style)
    pub fn with_embedding_model(self, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            embedding_model: model.into(),
            embedding_dimension: dimension,
            ..self
        }
    }

    /// Set the chat model or deployment (builder style)
    pub fn with_chat_model(self, model: impl Into<String>) -> Self {
        Self {
            chat_model: model.into(),
            ..self
        }
    }

    /// Set an explicit API key, bypassing the environment (builder style)
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..self
        }
    }

    /// Set the request timeout (builder style)
    pub fn with_timeout_secs(self, timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            ..self
        }
    }

    /// Name of the environment variable holding the API key.
    pub fn api_key_var(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.flavor.default_api_key_env())
    }

    /// Resolve the API key from the explicit setting or the environment.
    ///
    /// Returns the variable name that was consulted when no key is found.
    pub fn resolve_api_key(&self) -> std::result::Result<String, String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        let var = self.api_key_var();
        match std::env::var(var) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(var.to_string()),
        }
    }

    /// URL of the embeddings endpoint.
    pub fn embeddings_url(&self) -> String {
        self.operation_url(&self.embedding_model, "embeddings")
    }

    /// URL of the chat completions endpoint.
    pub fn chat_url(&self) -> String {
        self.operation_url(&self.chat_model, "chat/completions")
    }

    fn operation_url(&self, deployment: &str, operation: &str) -> String {
        match self.flavor {
            ApiFlavor::OpenAi => format!("{}/{}", self.base_url.trim_end_matches('/'), operation),
            ApiFlavor::Azure => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                self.endpoint.as_deref().unwrap_or_default().trim_end_matches('/'),
                deployment,
                operation,
                self.api_version
            ),
        }
    }

    /// Validate settings that are required for the selected flavor.
    pub fn validate(&self) -> Result<()> {
        if self.flavor == ApiFlavor::Azure
            && self.endpoint.as_deref().is_none_or(|e| e.trim().is_empty())
        {
            return Err(EmbedError::invalid_config(
                "Azure flavor requires `endpoint` to be set",
            ));
        }
        if self.flavor == ApiFlavor::OpenAi && self.base_url.trim().is_empty() {
            return Err(EmbedError::invalid_config("`base_url` must not be empty"));
        }
        if self.embedding_model.trim().is_empty() || self.chat_model.trim().is_empty() {
            return Err(EmbedError::invalid_config(
                "embedding and chat models must be named",
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(EmbedError::invalid_config(
                "embedding dimension must be greater than zero",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(EmbedError::invalid_config(
                "timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}
