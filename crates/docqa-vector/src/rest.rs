use std::hash::Hasher;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use docqa_core::config::VectorServiceConfig;
use docqa_core::error::{Error, Result};
use docqa_core::retry::{with_retries, RetryPolicy};
use docqa_core::traits::VectorIndex;
use docqa_core::types::{Chunk, RetrievalMethod, SearchHit};

const SERVICE: &str = "vector database";

/// REST adapter for a collection-addressed vector database.
///
/// Point ids are derived from chunk ids via xxhash64, so upserting the same
/// chunk id overwrites the stored vector; the chunk id itself travels in the
/// payload and is what callers get back from queries.
pub struct RestVectorIndex {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    collection: String,
    retry: RetryPolicy,
}

fn point_id(chunk_id: &str) -> u64 {
    let mut hasher = twox_hash::XxHash64::with_seed(0);
    hasher.write(chunk_id.as_bytes());
    hasher.finish()
}

fn transport_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ServiceTimeout { service: SERVICE.to_string() }
    } else {
        Error::ServiceUnavailable { service: SERVICE.to_string(), message: e.to_string() }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<PointPayload>,
}

#[derive(Deserialize)]
struct PointPayload {
    chunk_id: String,
}

impl RestVectorIndex {
    pub fn new(cfg: &VectorServiceConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            collection: cfg.collection.clone(),
            retry,
        })
    }

    fn status_err(&self, status: reqwest::StatusCode, body: &str) -> Error {
        if status == reqwest::StatusCode::NOT_FOUND {
            return Error::IndexNotFound(self.collection.clone());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Error::ServiceUnavailable {
                service: SERVICE.to_string(),
                message: format!("{status}: {body}"),
            };
        }
        Error::Validation(format!("vector database rejected request ({status}): {body}"))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.request(method, url);
        if !self.api_key.is_empty() {
            req = req.header("api-key", &self.api_key);
        }
        req
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(self.status_err(status, &body))
    }

    async fn create_collection(&self, dim: usize) -> Result<()> {
        // Drop any previous collection so reindexing never leaves stale
        // points behind; a missing collection is not an error here.
        let del = self
            .request(reqwest::Method::DELETE, &format!("/collections/{}", self.collection))
            .send()
            .await
            .map_err(transport_err)?;
        if !del.status().is_success() && del.status() != reqwest::StatusCode::NOT_FOUND {
            let status = del.status();
            let body = del.text().await.unwrap_or_default();
            return Err(self.status_err(status, &body));
        }

        let body = serde_json::json!({
            "vectors": { "size": dim, "distance": "Cosine" }
        });
        let resp = self
            .request(reqwest::Method::PUT, &format!("/collections/{}", self.collection))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        self.check(resp).await?;
        Ok(())
    }

    async fn upsert_points(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        let points: Vec<serde_json::Value> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, vector)| {
                serde_json::json!({
                    "id": point_id(&chunk.id),
                    "vector": vector,
                    "payload": {
                        "chunk_id": chunk.id,
                        "ordinal": chunk.ordinal,
                        "page": chunk.page,
                        "section": chunk.section,
                    },
                })
            })
            .collect();
        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", self.collection),
            )
            .json(&serde_json::json!({ "points": points }))
            .send()
            .await
            .map_err(transport_err)?;
        self.check(resp).await?;
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "vector": embedding,
            "limit": k,
            "with_payload": true,
        });
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let resp = self.check(resp).await?;
        let parsed: SearchResponse = resp.json().await.map_err(transport_err)?;
        let mut hits = Vec::with_capacity(parsed.result.len());
        for point in parsed.result {
            let Some(payload) = point.payload else {
                warn!(collection = %self.collection, "search hit without payload, skipping");
                continue;
            };
            hits.push(SearchHit {
                id: payload.chunk_id,
                score: point.score,
                method: RetrievalMethod::Vector,
            });
        }
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for RestVectorIndex {
    async fn ensure(&self, dim: usize) -> Result<()> {
        with_retries(&self.retry, SERVICE, || self.create_collection(dim)).await
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Internal(format!(
                "{} chunks but {} embeddings in upsert",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(());
        }
        with_retries(&self.retry, SERVICE, || self.upsert_points(chunks, embeddings)).await
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        with_retries(&self.retry, SERVICE, || self.search(embedding, k)).await
    }
}
