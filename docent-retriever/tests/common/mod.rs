//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docent_context::DocumentChunk;
use docent_embed::{DEFAULT_ANSWER_TEMPLATE, EmbedError, Embedder, GenerateError, Generator, render_answer_prompt};
use docent_retriever::storage::{
    Attachment, InMemoryStore, RetrievalResult, StoreError, StoreKind, VectorBackend, VectorStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

const VOCABULARY: &[&str] = &[
    "cat", "mammal", "purr", "dog", "bark", "rain", "weather", "spring", "pdf", "fish",
];

/// Embeds texts as word counts over a small vocabulary and counts its calls.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
    pub delay: Option<Duration>,
}

impl CountingEmbedder {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = VOCABULARY
        .iter()
        .map(|word| lower.matches(word).count() as f32)
        .collect();
    // Constant component keeps every vector non-zero
    vector.push(0.1);
    vector
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, texts: &[String]) -> docent_embed::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// Embeds like [`CountingEmbedder`] but fails on its `fail_on`-th call (1-based).
pub struct FailingEmbedder {
    pub inner: CountingEmbedder,
    pub fail_on: usize,
}

impl FailingEmbedder {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: CountingEmbedder::default(),
            fail_on,
        }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, texts: &[String]) -> docent_embed::Result<Vec<Vec<f32>>> {
        if self.inner.calls() + 1 == self.fail_on {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            return Err(EmbedError::invalid_response("embedding service reset the connection"));
        }
        self.inner.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Answers with the context it was given.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn complete(&self, context: &str, _question: &str) -> Result<String, GenerateError> {
        Ok(context.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Answers with the full rendered prompt.
pub struct PromptEchoGenerator;

#[async_trait]
impl Generator for PromptEchoGenerator {
    async fn complete(&self, context: &str, question: &str) -> Result<String, GenerateError> {
        Ok(render_answer_prompt(DEFAULT_ANSWER_TEMPLATE, context, question))
    }

    fn name(&self) -> &str {
        "prompt-echo"
    }
}

/// An in-memory store that reports itself as persistent.
#[derive(Default)]
pub struct DurableStore {
    inner: InMemoryStore,
}

#[async_trait]
impl VectorStore for DurableStore {
    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        self.inner.upsert(chunks, vectors).await
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult, StoreError> {
        self.inner.search(query, k).await
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }
}

/// A persistent backend whose contents outlive any one pipeline.
///
/// Share one instance across pipelines to simulate process restarts.
#[derive(Default)]
pub struct SharedBackend {
    pub store: Arc<DurableStore>,
    pub attaches: AtomicUsize,
    pub down: AtomicBool,
}

impl SharedBackend {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorBackend for SharedBackend {
    async fn attach(&self, _collection: &str) -> Result<Attachment, StoreError> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("connection refused"));
        }
        let existing_points = self.store.count().await?;
        Ok(Attachment {
            store: self.store.clone(),
            existing_points,
        })
    }

    fn name(&self) -> &str {
        "shared"
    }
}

/// Writes `files` (relative path, contents) under `root`.
pub fn write_corpus(root: &std::path::Path, files: &[(&str, &str)]) -> std::io::Result<()> {
    for (path, contents) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
    }
    Ok(())
}
