//! Persistent vector store on the Qdrant REST API.
//!
//! Points carry the whole chunk as payload and sequential integer ids, so
//! equal scores can be ordered by insertion. The collection is created lazily
//! on the first upsert, once the vector dimension is known.

use super::{
    Attachment, RetrievalResult, ScoredChunk, StoreError, StoreKind, VectorBackend, VectorStore,
    check_pairing,
};
use async_trait::async_trait;
use docent_context::DocumentChunk;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
}

#[derive(Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Deserialize)]
struct SearchHit {
    id: u64,
    score: f32,
    payload: Option<DocumentChunk>,
}

/// Transport failures mean the service cannot be reached.
fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        StoreError::unavailable(err.to_string())
    } else {
        StoreError::backend(err.to_string())
    }
}

fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

async fn status_error(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body);
    if is_gateway_status(status) {
        StoreError::unavailable(message)
    } else {
        StoreError::backend(message)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    response
        .json::<QdrantResponse<T>>()
        .await
        .map(|r| r.result)
        .map_err(|e| StoreError::backend(format!("malformed response: {e}")))
}

#[derive(Debug, Clone)]
struct QdrantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }
}

pub struct QdrantBackend {
    client: QdrantClient,
}

impl QdrantBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client: QdrantClient {
                http,
                base_url,
                api_key,
            },
        })
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn attach(&self, collection: &str) -> Result<Attachment, StoreError> {
        let response = self
            .client
            .request(reqwest::Method::GET, &format!("/collections/{collection}"))
            .send()
            .await
            .map_err(transport_error)?;

        let (exists, existing_points) = match response.status() {
            StatusCode::NOT_FOUND => (false, 0),
            status if status.is_success() => {
                let info: CollectionInfo = decode(response).await?;
                (true, info.points_count.unwrap_or(0))
            }
            _ => return Err(status_error(response).await),
        };

        debug!(
            "Qdrant collection '{}' exists: {}, points: {}",
            collection, exists, existing_points
        );

        let store = QdrantStore {
            client: self.client.clone(),
            collection: collection.to_string(),
            created: AtomicBool::new(exists),
            next_id: AtomicU64::new(existing_points),
        };
        Ok(Attachment {
            store: Arc::new(store),
            existing_points: existing_points as usize,
        })
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

pub struct QdrantStore {
    client: QdrantClient,
    collection: String,
    created: AtomicBool,
    next_id: AtomicU64,
}

impl QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), StoreError> {
        if self.created.load(Ordering::SeqCst) {
            return Ok(());
        }

        let response = self
            .client
            .request(reqwest::Method::PUT, &format!("/collections/{}", self.collection))
            .json(&json!({ "vectors": { "size": dimension, "distance": "Cosine" } }))
            .send()
            .await
            .map_err(transport_error)?;

        // Another writer may have created it first.
        if !response.status().is_success() && response.status() != StatusCode::CONFLICT {
            return Err(status_error(response).await);
        }

        debug!(
            "Created Qdrant collection '{}' with dimension {}",
            self.collection, dimension
        );
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<(), StoreError> {
        check_pairing(chunks, vectors)?;
        let Some(dimension) = vectors.first().map(Vec::len) else {
            return Ok(());
        };
        self.ensure_collection(dimension).await?;

        let first_id = self.next_id.fetch_add(chunks.len() as u64, Ordering::SeqCst);
        let points: Vec<serde_json::Value> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| {
                json!({
                    "id": first_id + i as u64,
                    "vector": vector,
                    "payload": chunk,
                })
            })
            .collect();

        let response = self
            .client
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", self.collection),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&json!({ "vector": query, "limit": k, "with_payload": true }))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut hits: Vec<SearchHit> = decode(response).await?;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));

        hits.into_iter()
            .take(k)
            .map(|hit| -> Result<ScoredChunk, StoreError> {
                let chunk = hit.payload.ok_or_else(|| {
                    StoreError::backend(format!("point {} has no payload", hit.id))
                })?;
                Ok(ScoredChunk {
                    chunk,
                    score: hit.score,
                })
            })
            .collect()
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .request(reqwest::Method::GET, "/healthz")
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .client
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/count", self.collection),
            )
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let result: CountResult = decode(response).await?;
        Ok(result.count as usize)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .request(reqwest::Method::DELETE, &format!("/collections/{}", self.collection))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(status_error(response).await);
        }

        self.created.store(false, Ordering::SeqCst);
        self.next_id.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/")
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let backend = QdrantBackend::new(closed_port_url(), None, Duration::from_secs(2)).unwrap();
        let err = backend.attach("docent").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }), "got {err:?}");
    }

    #[test]
    fn test_gateway_statuses() {
        assert!(is_gateway_status(StatusCode::BAD_GATEWAY));
        assert!(is_gateway_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_gateway_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_gateway_status(StatusCode::BAD_REQUEST));
        assert!(!is_gateway_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_base_url_normalized() {
        let backend =
            QdrantBackend::new("http://localhost:6333/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.client.url("/collections/docent"),
            "http://localhost:6333/collections/docent"
        );
    }

    #[test]
    fn test_decode_search_hits() {
        let body = r#"{"result": [
            {"id": 3, "score": 0.5, "payload": {"text": "Cats purr.", "metadata": {
                "category": "animals", "filename": "cats.txt", "source_path": "animals/cats.txt",
                "chunk_index": 0, "page": null, "start_offset": 0}}}
        ], "status": "ok", "time": 0.001}"#;
        let parsed: QdrantResponse<Vec<SearchHit>> = serde_json::from_str(body).unwrap();
        let hit = &parsed.result[0];
        assert_eq!(hit.id, 3);
        assert_eq!(hit.payload.as_ref().unwrap().metadata.category, "animals");
    }
}
