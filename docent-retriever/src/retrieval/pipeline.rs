//! Lazy, single-flight construction of the searchable index.
//!
//! The pipeline owns one [`PipelineState`] behind an async mutex. The first
//! caller of [`RetrievalPipeline::ensure_ready`] runs initialization while
//! holding the lock; concurrent callers wait on the lock and then observe the
//! outcome. A failure is sticky for the life of the process.
//!
//! ## Initialization
//!
//! ```text
//! CacheCheck: scan corpus, load manifest, compare fingerprints
//!   ├─ valid  → attach persistent store; reuse it if it holds points
//!   └─ else   → clear store → scan + fingerprint → load → chunk
//!               → embed in batches (bounded) → upsert each batch → save manifest
//! ```
//!
//! The manifest is written only when the index lives in the persistent
//! backend. An in-memory index dies with the process, so recording it would
//! produce false cache hits on the next start.

use super::chunking_strategy::{ChunkingConfig, ChunkingStrategy};
use super::worker_pool::WorkerPool;
use crate::cache::CacheManifest;
use crate::corpus::{DocumentLoader, FingerprintMode, SourceFile, scan};
use crate::error::{Result, RetrieverError};
use crate::status::{PipelinePhase, PipelineStatus};
use crate::storage::{
    RetrievalResult, StoreKind, StoreSelection, VectorBackend, VectorStore, select_store,
};
use chrono::Utc;
use docent_context::DocumentChunk;
use docent_embed::{EmbedError, Embedder};
use futures::{FutureExt, StreamExt};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Configuration for the retrieval pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the document corpus
    pub corpus_root: PathBuf,
    /// Location of the cache manifest
    pub manifest_path: PathBuf,
    pub keep_whole_pdf: bool,
    pub load_concurrency: usize,
    pub chunking: ChunkingConfig,
    pub fingerprint_mode: FingerprintMode,
    pub detect_deletions: bool,
    /// Collection name in the persistent backend
    pub collection: String,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
}

impl PipelineConfig {
    /// Defaults for a corpus at `corpus_root`, with the manifest inside it.
    pub fn new(corpus_root: impl Into<PathBuf>) -> Self {
        let corpus_root = corpus_root.into();
        Self {
            manifest_path: corpus_root.join(".docent-cache.json"),
            corpus_root,
            keep_whole_pdf: true,
            load_concurrency: 3,
            chunking: ChunkingConfig::default(),
            fingerprint_mode: FingerprintMode::Fast,
            detect_deletions: true,
            collection: "docent".to_string(),
            embed_batch_size: 64,
            embed_concurrency: 4,
        }
    }

    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_fingerprint_mode(mut self, mode: FingerprintMode) -> Self {
        self.fingerprint_mode = mode;
        self
    }

    pub fn with_detect_deletions(mut self, detect: bool) -> Self {
        self.detect_deletions = detect;
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_keep_whole_pdf(mut self, keep: bool) -> Self {
        self.keep_whole_pdf = keep;
        self
    }

    pub fn with_load_concurrency(mut self, limit: usize) -> Self {
        self.load_concurrency = limit;
        self
    }

    /// Set how many chunks go into one embedding request and how many
    /// requests may be in flight.
    pub fn with_embedding_limits(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.embed_batch_size = batch_size;
        self.embed_concurrency = concurrency;
        self
    }
}

/// A searchable index, shared by every caller once initialization succeeds.
pub struct ReadyIndex {
    pub store: Arc<dyn VectorStore>,
    pub chunk_count: usize,
    /// Reused from a previous run instead of rebuilt
    pub from_cache: bool,
    pub degraded: bool,
}

impl std::fmt::Debug for ReadyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyIndex")
            .field("kind", &self.store.kind())
            .field("chunk_count", &self.chunk_count)
            .field("from_cache", &self.from_cache)
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// The single owner of initialization progress.
#[derive(Debug, Default)]
pub enum PipelineState {
    #[default]
    Uninitialized,
    Ready(Arc<ReadyIndex>),
    Failed(String),
}

pub struct RetrievalPipeline {
    config: PipelineConfig,
    embedder: Arc<dyn Embedder>,
    backend: Option<Arc<dyn VectorBackend>>,
    loader: DocumentLoader,
    chunker: ChunkingStrategy,
    state: Mutex<PipelineState>,
    status: RwLock<PipelineStatus>,
}

impl RetrievalPipeline {
    /// Creates an uninitialized pipeline; nothing is read until first use.
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        backend: Option<Arc<dyn VectorBackend>>,
    ) -> Result<Self> {
        if config.embed_batch_size == 0 {
            return Err(RetrieverError::config("embed_batch_size must be greater than zero"));
        }
        let chunker = ChunkingStrategy::new(config.chunking)?;
        let loader = DocumentLoader::new(config.keep_whole_pdf, config.load_concurrency);

        Ok(Self {
            config,
            embedder,
            backend,
            loader,
            chunker,
            state: Mutex::new(PipelineState::Uninitialized),
            status: RwLock::new(PipelineStatus::default()),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current status snapshot; never waits for initialization.
    pub fn status(&self) -> PipelineStatus {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Initialize on first call; later calls return the same index or failure.
    pub async fn ensure_ready(&self) -> Result<Arc<ReadyIndex>> {
        let mut state = self.state.lock().await;
        match &*state {
            PipelineState::Ready(index) => return Ok(Arc::clone(index)),
            PipelineState::Failed(message) => {
                return Err(RetrieverError::PipelineFailed {
                    message: message.clone(),
                });
            }
            PipelineState::Uninitialized => {}
        }

        match self.initialize().await {
            Ok(index) => {
                let index = Arc::new(index);
                info!(
                    "Retrieval pipeline ready: {} chunks in {} store{}",
                    index.chunk_count,
                    index.store.kind(),
                    if index.from_cache { " (from cache)" } else { "" }
                );
                self.update_status(|s| s.chunks_indexed = index.chunk_count);
                self.set_phase(PipelinePhase::Ready);
                *state = PipelineState::Ready(Arc::clone(&index));
                Ok(index)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Retrieval pipeline initialization failed: {}", message);
                self.update_status(|s| s.error = Some(message.clone()));
                self.set_phase(PipelinePhase::Failed);
                *state = PipelineState::Failed(message);
                Err(e)
            }
        }
    }

    /// Embed `query` and return the `k` most similar chunks.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let index = self.ensure_ready().await?;
        if k == 0 || index.chunk_count == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        Ok(index.store.search(&vector, k).await?)
    }

    async fn initialize(&self) -> Result<ReadyIndex> {
        self.set_phase(PipelinePhase::CacheCheck);
        let files = self.scan_corpus().await?;

        let manifest = match CacheManifest::load(&self.config.manifest_path).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("{}; treating as cache miss", e);
                CacheManifest::new()
            }
        };
        let cache_valid = manifest
            .is_valid_for(&files, self.config.fingerprint_mode, self.config.detect_deletions)
            .await;

        let mut selection = None;
        if cache_valid {
            self.set_phase(PipelinePhase::CacheHit);
            self.set_phase(PipelinePhase::BackendAttach);
            let attached = self.select().await?;

            if attached.store.kind() == StoreKind::Persistent && attached.existing_points > 0 {
                info!(
                    "Cache manifest matches {} files; reusing {} indexed chunks",
                    files.len(),
                    attached.existing_points
                );
                self.update_status(|s| s.cache_hit = Some(true));
                return Ok(ReadyIndex {
                    store: attached.store,
                    chunk_count: attached.existing_points,
                    from_cache: true,
                    degraded: false,
                });
            }

            info!("Cache manifest matches but no persistent index is available; rebuilding");
            selection = Some(attached);
        }

        self.update_status(|s| s.cache_hit = Some(false));
        self.set_phase(PipelinePhase::CacheMiss);
        let selection = match selection {
            Some(selection) => selection,
            None => self.select().await?,
        };
        self.rebuild(selection).await
    }

    async fn rebuild(&self, selection: StoreSelection) -> Result<ReadyIndex> {
        let store = selection.store;
        if store.kind() == StoreKind::Persistent {
            // Until Persisting succeeds the collection may hold a partial index
            CacheManifest::remove(&self.config.manifest_path).await?;
        }
        store.clear().await?;

        self.set_phase(PipelinePhase::Scanning);
        let files = self.scan_corpus().await?;
        let manifest = CacheManifest::build(&files, self.config.fingerprint_mode).await?;

        self.set_phase(PipelinePhase::Loading);
        let report = self.loader.load_all(&files).await;
        info!(
            "Loaded {} files ({} skipped) into {} segments",
            report.loaded_files,
            report.skipped_files.len(),
            report.segments.len()
        );
        self.update_status(|s| {
            s.files_loaded = report.loaded_files;
            s.skipped_files = report.skipped_files.clone();
        });

        self.set_phase(PipelinePhase::Chunking);
        let chunks = self.chunker.chunk_segments(&report.segments);
        info!("Split corpus into {} chunks", chunks.len());

        self.set_phase(PipelinePhase::Embedding);
        let embedded = self.embed_and_store(&chunks, store.as_ref()).await?;

        self.set_phase(PipelinePhase::Persisting);
        if store.kind() == StoreKind::Persistent {
            // The index is usable either way; a stale manifest only costs a rebuild.
            if let Err(e) = manifest.save(&self.config.manifest_path).await {
                warn!("Failed to save cache manifest: {}", e);
            }
        } else {
            debug!("In-memory index; leaving cache manifest untouched");
        }

        Ok(ReadyIndex {
            store,
            chunk_count: embedded,
            from_cache: false,
            degraded: selection.degraded,
        })
    }

    /// Embed chunks in bounded-concurrency batches, upserting each batch in
    /// order as soon as it is ready. Batches stored before a failure stay.
    async fn embed_and_store(&self, chunks: &[DocumentChunk], store: &dyn VectorStore) -> Result<usize> {
        let pool = WorkerPool::new(self.config.embed_concurrency);
        let embedder = self.embedder.as_ref();

        let mut batches = pool.stream(chunks.chunks(self.config.embed_batch_size), |batch| async move {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RetrieverError::Embedding(EmbedError::invalid_response(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                ))));
            }
            Ok::<_, RetrieverError>((batch, vectors))
        }
        .boxed())
        .boxed();

        let mut embedded = 0;
        while let Some(result) = batches.next().await {
            let (batch, vectors) = result?;
            store.upsert(batch, &vectors).await?;
            embedded += batch.len();
            debug!("Stored {}/{} chunks", embedded, chunks.len());
            self.update_status(|s| s.chunks_embedded = embedded);
        }
        Ok(embedded)
    }

    async fn scan_corpus(&self) -> Result<Vec<SourceFile>> {
        let root = self.config.corpus_root.clone();
        let files = tokio::task::spawn_blocking(move || scan(&root)).await??;
        info!(
            "Found {} supported files under {}",
            files.len(),
            self.config.corpus_root.display()
        );
        self.update_status(|s| s.files_scanned = files.len());
        Ok(files)
    }

    async fn select(&self) -> Result<StoreSelection> {
        let selection = select_store(self.backend.as_deref(), &self.config.collection).await?;
        self.update_status(|s| {
            s.backend = Some(selection.store.kind());
            s.degraded = selection.degraded;
        });
        Ok(selection)
    }

    fn set_phase(&self, phase: PipelinePhase) {
        info!("Pipeline phase: {}", phase);
        self.update_status(|s| s.phase = phase);
    }

    fn update_status(&self, apply: impl FnOnce(&mut PipelineStatus)) {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut status);
        status.updated_at = Utc::now();
    }
}
