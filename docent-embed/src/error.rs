//! Error types for embedding and completion providers

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers configuration problems, transport failures when talking to a remote
/// provider, malformed provider responses, and local model failures. Providers
/// never retry; callers see the first failure.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The environment variable holding the API key is unset or empty
    #[error("API key not found in environment variable {var}")]
    MissingApiKey { var: String },

    /// Transport-level failure (connection refused, timeout, TLS)
    #[error("Embedding request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status
    #[error("Embedding provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider answered with a body that does not match the expected shape
    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },

    /// Error during local model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during local embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Create a model initialization error from any error type.
    pub fn model_init<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

/// Error type for answer generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Invalid generation configuration: {message}")]
    InvalidConfig { message: String },

    #[error("API key not found in environment variable {var}")]
    MissingApiKey { var: String },

    #[error("Completion request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("Completion provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid completion response: {message}")]
    InvalidResponse { message: String },
}

impl GenerateError {
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}
