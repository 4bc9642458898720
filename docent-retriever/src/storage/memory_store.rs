//! Process-local vector store with exhaustive cosine ranking.

use super::{
    EmbeddedChunk, RetrievalResult, ScoredChunk, StoreError, StoreKind, VectorStore,
    check_pairing, cosine_similarity,
};
use async_trait::async_trait;
use docent_context::DocumentChunk;
use tokio::sync::RwLock;

/// Entries in insertion order; lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<EmbeddedChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        check_pairing(chunks, vectors)?;

        let mut entries = self.entries.write().await;
        let expected = entries
            .first()
            .map(|e| e.vector.len())
            .or_else(|| vectors.first().map(Vec::len));
        if let Some(dim) = expected {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(StoreError::invalid_input(format!(
                    "vector dimension {} does not match store dimension {}",
                    bad.len(),
                    dim
                )));
            }
        }

        entries.extend(chunks.iter().zip(vectors).map(|(chunk, vector)| EmbeddedChunk {
            chunk: chunk.clone(),
            vector: vector.clone(),
        }));
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult, StoreError> {
        let entries = self.entries.read().await;
        if k == 0 || entries.is_empty() {
            return Ok(Vec::new());
        }
        if entries[0].vector.len() != query.len() {
            return Err(StoreError::invalid_input(format!(
                "query dimension {} does not match store dimension {}",
                query.len(),
                entries[0].vector.len()
            )));
        }

        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::InMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_context::ChunkMetadata;

    fn chunk(text: &str, index: usize) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                category: ".".to_string(),
                filename: "notes.txt".to_string(),
                source_path: "notes.txt".to_string(),
                chunk_index: index,
                page: None,
                start_offset: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryStore::new();
        store
            .upsert(
                &[chunk("east", 0), chunk("north", 1), chunk("north-east", 2)],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
            )
            .await
            .unwrap();

        let results = store.search(&[0.0, 1.0], 6).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east", "east"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_respects_k_and_size() {
        let store = InMemoryStore::new();
        assert!(store.search(&[1.0], 3).await.unwrap().is_empty());

        store.upsert(&[chunk("only", 0)], &[vec![1.0, 0.0]]).await.unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 6).await.unwrap().len(), 1);
        assert!(store.search(&[1.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryStore::new();
        store
            .upsert(
                &[chunk("first", 0), chunk("second", 1), chunk("third", 2)],
                &[vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
            )
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryStore::new();
        store.upsert(&[chunk("a", 0)], &[vec![1.0, 0.0]]).await.unwrap();

        assert!(matches!(
            store.upsert(&[chunk("b", 1)], &[vec![1.0]]).await,
            Err(StoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 1).await,
            Err(StoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.upsert(&[chunk("c", 2)], &[]).await,
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_and_count() {
        let store = InMemoryStore::new();
        store
            .upsert(&[chunk("a", 0), chunk("b", 1)], &[vec![1.0], vec![0.5]])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.kind(), StoreKind::InMemory);
    }
}
