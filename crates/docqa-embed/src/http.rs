use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use docqa_core::config::EmbeddingServiceConfig;
use docqa_core::error::{Error, Result};
use docqa_core::retry::{with_retries, RetryPolicy};
use docqa_core::traits::Embedder;

const SERVICE: &str = "embedding provider";

/// Client for an OpenAI-style `POST /v1/embeddings` endpoint.
///
/// Transient failures (timeout, connect, 429, 5xx) are retried per the
/// configured policy; anything else is surfaced immediately.
pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

fn transport_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ServiceTimeout { service: SERVICE.to_string() }
    } else {
        Error::ServiceUnavailable { service: SERVICE.to_string(), message: e.to_string() }
    }
}

fn status_err(status: reqwest::StatusCode, body: &str) -> Error {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::ServiceUnavailable {
            service: SERVICE.to_string(),
            message: format!("{status}: {body}"),
        }
    } else {
        Error::Validation(format!("embedding provider rejected request ({status}): {body}"))
    }
}

impl HttpEmbedder {
    pub fn new(cfg: &EmbeddingServiceConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            dim: cfg.dim,
            retry,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_err(status, &text));
        }
        let parsed: EmbeddingsResponse = resp.json().await.map_err(transport_err)?;
        if parsed.data.len() != texts.len() {
            return Err(Error::Validation(format!(
                "embedding provider returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        let mut out = Vec::with_capacity(parsed.data.len());
        for row in parsed.data {
            if row.embedding.len() != self.dim {
                return Err(Error::Validation(format!(
                    "embedding provider returned {} dims, expected {}",
                    row.embedding.len(),
                    self.dim
                )));
            }
            out.push(row.embedding);
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retries(&self.retry, SERVICE, || self.request(texts)).await
    }
}
