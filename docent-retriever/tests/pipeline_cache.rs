//! Cache reuse, invalidation and backend fallback across simulated restarts.

mod common;

use anyhow::Result;
use common::{CountingEmbedder, FailingEmbedder, SharedBackend, write_corpus};
use docent_retriever::cache::CacheManifest;
use docent_retriever::corpus::FingerprintMode;
use docent_retriever::retrieval::{PipelineConfig, RetrievalPipeline};
use docent_retriever::status::PipelinePhase;
use docent_retriever::storage::{StoreKind, VectorBackend, VectorStore};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;
use tracing_test::traced_test;

fn pipeline(
    root: &Path,
    embedder: &Arc<CountingEmbedder>,
    backend: &Arc<SharedBackend>,
) -> Result<RetrievalPipeline> {
    pipeline_with(PipelineConfig::new(root), embedder, backend)
}

fn pipeline_with(
    config: PipelineConfig,
    embedder: &Arc<CountingEmbedder>,
    backend: &Arc<SharedBackend>,
) -> Result<RetrievalPipeline> {
    let backend: Arc<dyn VectorBackend> = backend.clone();
    Ok(RetrievalPipeline::new(config, embedder.clone(), Some(backend))?)
}

const CORPUS: &[(&str, &str)] = &[
    ("animals/cats.txt", "Cats are mammals. Cats purr when content."),
    ("animals/dogs.md", "# Dogs\n\nDogs bark at the mail carrier."),
    ("weather.txt", "It rains a lot in spring."),
];

#[tokio::test]
async fn test_unchanged_corpus_reuses_persistent_index() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());

    let first_embedder = Arc::new(CountingEmbedder::default());
    let first = pipeline(dir.path(), &first_embedder, &backend)?;
    let built = first.ensure_ready().await?;
    assert!(!built.from_cache);
    assert_eq!(built.chunk_count, 3);
    assert!(first_embedder.texts() >= 3);
    assert!(dir.path().join(".docent-cache.json").exists());

    // Restart: a fresh pipeline over the same corpus and backend
    let second_embedder = Arc::new(CountingEmbedder::default());
    let second = pipeline(dir.path(), &second_embedder, &backend)?;
    let reused = second.ensure_ready().await?;
    assert!(reused.from_cache);
    assert_eq!(reused.chunk_count, 3);
    assert_eq!(second_embedder.calls(), 0);

    let status = second.status();
    assert_eq!(status.cache_hit, Some(true));
    assert_eq!(status.backend, Some(StoreKind::Persistent));

    let results = second.search("Do cats purr?", 1).await?;
    assert_eq!(results[0].chunk.metadata.filename, "cats.txt");
    // Only the query was embedded
    assert_eq!(second_embedder.texts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_size_change_triggers_rebuild() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());

    let embedder = Arc::new(CountingEmbedder::default());
    pipeline(dir.path(), &embedder, &backend)?.ensure_ready().await?;

    std::fs::write(
        dir.path().join("weather.txt"),
        "It rains a lot in spring. Cats dislike the rain.",
    )?;

    let embedder = Arc::new(CountingEmbedder::default());
    let rebuilt = pipeline(dir.path(), &embedder, &backend)?;
    let index = rebuilt.ensure_ready().await?;
    assert!(!index.from_cache);
    assert!(embedder.calls() > 0);
    // The old points were cleared, not duplicated
    assert_eq!(backend.store.count().await?, index.chunk_count);
    Ok(())
}

#[tokio::test]
async fn test_added_and_removed_files_trigger_rebuild() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());
    pipeline(dir.path(), &Arc::new(CountingEmbedder::default()), &backend)?
        .ensure_ready()
        .await?;

    write_corpus(dir.path(), &[("fish.txt", "Fish swim.")])?;
    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline(dir.path(), &embedder, &backend)?.ensure_ready().await?;
    assert!(!index.from_cache);
    assert_eq!(index.chunk_count, 4);

    std::fs::remove_file(dir.path().join("fish.txt"))?;
    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline(dir.path(), &embedder, &backend)?.ensure_ready().await?;
    assert!(!index.from_cache);
    assert_eq!(index.chunk_count, 3);

    // With deletion detection off, a removed file alone keeps the cache
    std::fs::remove_file(dir.path().join("weather.txt"))?;
    let embedder = Arc::new(CountingEmbedder::default());
    let config = PipelineConfig::new(dir.path()).with_detect_deletions(false);
    let index = pipeline_with(config, &embedder, &backend)?.ensure_ready().await?;
    assert!(index.from_cache);
    assert_eq!(embedder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_content_mode_catches_same_size_edit() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), &[("cats.txt", "Cats are mammals.")])?;
    let path = dir.path().join("cats.txt");
    let pinned = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    std::fs::File::options().write(true).open(&path)?.set_modified(pinned)?;

    let backend = Arc::new(SharedBackend::default());
    let fast = PipelineConfig::new(dir.path());
    let content = PipelineConfig::new(dir.path())
        .with_manifest_path(dir.path().join(".content-cache.json"))
        .with_fingerprint_mode(FingerprintMode::Content);

    pipeline_with(content.clone(), &Arc::new(CountingEmbedder::default()), &backend)?
        .ensure_ready()
        .await?;
    pipeline_with(fast.clone(), &Arc::new(CountingEmbedder::default()), &backend)?
        .ensure_ready()
        .await?;

    // Same length, same mtime, different bytes
    std::fs::write(&path, "Dogs are mammals.")?;
    std::fs::File::options().write(true).open(&path)?.set_modified(pinned)?;

    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline_with(fast, &embedder, &backend)?.ensure_ready().await?;
    assert!(index.from_cache, "fast fingerprints cannot see this edit");

    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline_with(content, &embedder, &backend)?.ensure_ready().await?;
    assert!(!index.from_cache);
    assert!(embedder.calls() > 0);
    Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_unreachable_backend_degrades_to_memory() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());
    backend.set_down(true);

    let embedder = Arc::new(CountingEmbedder::default());
    let degraded = pipeline(dir.path(), &embedder, &backend)?;
    let index = degraded.ensure_ready().await?;

    assert!(index.degraded);
    assert_eq!(index.store.kind(), StoreKind::InMemory);
    assert_eq!(index.chunk_count, 3);
    assert!(degraded.status().degraded);
    assert!(logs_contain("degraded mode"));
    // An in-memory index must not leave a manifest behind
    assert!(!dir.path().join(".docent-cache.json").exists());

    let results = degraded.search("Why do dogs bark?", 2).await?;
    assert_eq!(results[0].chunk.metadata.filename, "dogs.md");
    Ok(())
}

#[tokio::test]
async fn test_valid_manifest_with_backend_down_rebuilds_in_memory() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());
    pipeline(dir.path(), &Arc::new(CountingEmbedder::default()), &backend)?
        .ensure_ready()
        .await?;

    backend.set_down(true);
    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline(dir.path(), &embedder, &backend)?.ensure_ready().await?;
    assert!(!index.from_cache);
    assert!(index.degraded);
    assert!(embedder.calls() > 0);
    // Attached once while checking the cache; the rebuild reuses that decision
    assert_eq!(backend.attaches.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_valid_manifest_with_empty_collection_rebuilds() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());
    pipeline(dir.path(), &Arc::new(CountingEmbedder::default()), &backend)?
        .ensure_ready()
        .await?;

    backend.store.clear().await?;
    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline(dir.path(), &embedder, &backend)?.ensure_ready().await?;
    assert!(!index.from_cache);
    assert_eq!(index.chunk_count, 3);
    assert_eq!(backend.store.count().await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_rebuild_is_not_served_from_cache() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let manifest_path = dir.path().join(".docent-cache.json");
    let backend = Arc::new(SharedBackend::default());
    pipeline(dir.path(), &Arc::new(CountingEmbedder::default()), &backend)?
        .ensure_ready()
        .await?;
    assert!(manifest_path.exists());

    // Collection emptied behind our back, then the rebuild dies after one batch
    backend.store.clear().await?;
    let failing = Arc::new(FailingEmbedder::failing_on(2));
    let shared: Arc<dyn VectorBackend> = backend.clone();
    let interrupted = RetrievalPipeline::new(
        PipelineConfig::new(dir.path()).with_embedding_limits(1, 1),
        failing.clone(),
        Some(shared),
    )?;
    assert!(interrupted.ensure_ready().await.is_err());
    assert_eq!(interrupted.status().phase, PipelinePhase::Failed);
    assert_eq!(backend.store.count().await?, 1);
    assert!(!manifest_path.exists());

    // Restart: the partial collection must not count as a cache hit
    let embedder = Arc::new(CountingEmbedder::default());
    let restarted = pipeline(dir.path(), &embedder, &backend)?;
    let index = restarted.ensure_ready().await?;
    assert!(!index.from_cache);
    assert_eq!(index.chunk_count, 3);
    assert_eq!(backend.store.count().await?, 3);
    assert_eq!(restarted.status().cache_hit, Some(false));
    assert!(manifest_path.exists());
    Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_corrupt_manifest_is_a_cache_miss() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    std::fs::write(dir.path().join(".docent-cache.json"), "{not json")?;

    let backend = Arc::new(SharedBackend::default());
    let embedder = Arc::new(CountingEmbedder::default());
    let index = pipeline(dir.path(), &embedder, &backend)?.ensure_ready().await?;
    assert!(!index.from_cache);
    assert!(logs_contain("treating as cache miss"));

    // The rebuild replaced the corrupt manifest
    let manifest = CacheManifest::load(&dir.path().join(".docent-cache.json")).await?;
    assert_eq!(manifest.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_callers_share_one_build() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    let backend = Arc::new(SharedBackend::default());
    let embedder = Arc::new(CountingEmbedder::slow(Duration::from_millis(50)));
    let pipeline = Arc::new(pipeline(dir.path(), &embedder, &backend)?);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.ensure_ready().await })
        })
        .collect();

    let mut indexes = Vec::new();
    for handle in handles {
        indexes.push(handle.await??);
    }

    // Three chunks fit in one batch: exactly one embedding call for the build
    assert_eq!(embedder.calls(), 1);
    assert_eq!(backend.attaches.load(Ordering::SeqCst), 1);
    assert!(indexes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(pipeline.status().phase, PipelinePhase::Ready);
    Ok(())
}

#[tokio::test]
async fn test_skipped_pdf_does_not_block_indexing() -> Result<()> {
    let dir = tempdir()?;
    write_corpus(dir.path(), CORPUS)?;
    std::fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4 truncated")?;

    let backend = Arc::new(SharedBackend::default());
    let pipeline = pipeline(dir.path(), &Arc::new(CountingEmbedder::default()), &backend)?;
    let index = pipeline.ensure_ready().await?;
    assert_eq!(index.chunk_count, 3);

    let status = pipeline.status();
    assert_eq!(status.files_scanned, 4);
    assert_eq!(status.files_loaded, 3);
    assert_eq!(status.skipped_files, vec!["broken.pdf".to_string()]);
    Ok(())
}
