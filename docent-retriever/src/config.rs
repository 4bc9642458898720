//! TOML configuration for the `docent` binary.
//!
//! Every section is optional; missing keys take the defaults below. Secrets
//! never live in the file: the provider and Qdrant API keys are read from the
//! environment variables the file names.

use crate::corpus::FingerprintMode;
use crate::error::{Result, RetrieverError};
use crate::retrieval::chunking_strategy::ChunkingConfig;
use crate::retrieval::conversation::RetrievalQueryMode;
use crate::retrieval::pipeline::PipelineConfig;
use docent_embed::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocentConfig {
    pub corpus: CorpusSection,
    pub chunking: ChunkingSection,
    pub cache: CacheSection,
    pub store: StoreSection,
    pub embedding: EmbeddingSection,
    pub retrieval: RetrievalSection,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSection {
    pub root: PathBuf,
    /// Manifest file name, relative to `root` unless absolute
    pub manifest_file: PathBuf,
    /// One segment per PDF instead of one per page
    pub keep_whole_pdf: bool,
    pub load_concurrency: usize,
}

impl Default for CorpusSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./docs"),
            manifest_file: PathBuf::from(".docent-cache.json"),
            keep_whole_pdf: true,
            load_concurrency: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSection {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        let defaults = ChunkingConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub fingerprint: FingerprintMode,
    pub detect_deletions: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            fingerprint: FingerprintMode::Fast,
            detect_deletions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub collection: String,
    /// Qdrant REST endpoint; without it the index is in-memory only
    pub qdrant_url: Option<String>,
    pub qdrant_api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            collection: "docent".to_string(),
            qdrant_url: None,
            qdrant_api_key_env: "QDRANT_API_KEY".to_string(),
            timeout_secs: 5,
        }
    }
}

impl StoreSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The Qdrant API key, when its variable is set and non-empty.
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.qdrant_api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            embed_batch_size: 64,
            embed_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryModeSetting {
    #[default]
    LatestQuestion,
    RecentUserTurns,
    FullTranscript,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    pub query_mode: QueryModeSetting,
    /// User turns folded into the query in `recent-user-turns` mode
    pub history_turns: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 6,
            query_mode: QueryModeSetting::LatestQuestion,
            history_turns: 3,
        }
    }
}

impl DocentConfig {
    /// Read and validate a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RetrieverError::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RetrieverError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(RetrieverError::config("chunking.chunk_size must be greater than zero"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RetrieverError::config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.corpus.load_concurrency == 0 || self.embedding.embed_concurrency == 0 {
            return Err(RetrieverError::config("concurrency limits must be greater than zero"));
        }
        if self.embedding.embed_batch_size == 0 {
            return Err(RetrieverError::config(
                "embedding.embed_batch_size must be greater than zero",
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(RetrieverError::config("retrieval.top_k must be greater than zero"));
        }
        if self.store.collection.trim().is_empty() {
            return Err(RetrieverError::config("store.collection must not be empty"));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        if self.corpus.manifest_file.is_absolute() {
            self.corpus.manifest_file.clone()
        } else {
            self.corpus.root.join(&self.corpus.manifest_file)
        }
    }

    pub fn query_mode(&self) -> RetrievalQueryMode {
        match self.retrieval.query_mode {
            QueryModeSetting::LatestQuestion => RetrievalQueryMode::LatestQuestion,
            QueryModeSetting::RecentUserTurns => RetrievalQueryMode::RecentUserTurns {
                turns: self.retrieval.history_turns,
            },
            QueryModeSetting::FullTranscript => RetrievalQueryMode::FullTranscript,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(&self.corpus.root)
            .with_manifest_path(self.manifest_path())
            .with_keep_whole_pdf(self.corpus.keep_whole_pdf)
            .with_load_concurrency(self.corpus.load_concurrency)
            .with_chunking(ChunkingConfig::new(
                self.chunking.chunk_size,
                self.chunking.chunk_overlap,
            ))
            .with_fingerprint_mode(self.cache.fingerprint)
            .with_detect_deletions(self.cache.detect_deletions)
            .with_collection(self.store.collection.clone())
            .with_embedding_limits(
                self.embedding.embed_batch_size,
                self.embedding.embed_concurrency,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = DocentConfig::from_toml("").unwrap();
        assert_eq!(config, DocentConfig::default());
        assert_eq!(config.manifest_path(), PathBuf::from("./docs/.docent-cache.json"));
        assert_eq!(config.query_mode(), RetrievalQueryMode::LatestQuestion);
        assert!(config.store.qdrant_url.is_none());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = DocentConfig::from_toml(
            r#"
            [corpus]
            root = "/srv/docs"
            manifest_file = "/var/cache/docent.json"

            [chunking]
            chunk_size = 500
            chunk_overlap = 50

            [cache]
            fingerprint = "content"

            [store]
            qdrant_url = "http://localhost:6333"

            [retrieval]
            query_mode = "recent-user-turns"
            history_turns = 2

            [provider]
            flavor = "openai"
            "#,
        )
        .unwrap();

        assert_eq!(config.manifest_path(), PathBuf::from("/var/cache/docent.json"));
        assert_eq!(config.cache.fingerprint, FingerprintMode::Content);
        assert_eq!(config.query_mode(), RetrievalQueryMode::RecentUserTurns { turns: 2 });

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.corpus_root, PathBuf::from("/srv/docs"));
        assert_eq!(pipeline.chunking, ChunkingConfig::new(500, 50));
        assert_eq!(pipeline.collection, "docent");
    }

    #[test]
    fn test_validation_rejects_bad_limits() {
        for text in [
            "[chunking]\nchunk_size = 0",
            "[chunking]\nchunk_size = 20\nchunk_overlap = 20",
            "[corpus]\nload_concurrency = 0",
            "[embedding]\nembed_concurrency = 0",
            "[retrieval]\ntop_k = 0",
        ] {
            assert!(
                matches!(DocentConfig::from_toml(text), Err(RetrieverError::Config { .. })),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(
            DocentConfig::from_toml("[chunking\nchunk_size = 1"),
            Err(RetrieverError::Config { .. })
        ));
    }
}
