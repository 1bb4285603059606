use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use docqa_core::config::LlmServiceConfig;
use docqa_core::error::{Error, Result};
use docqa_core::traits::LanguageModel;

/// Client for an OpenAI-style `POST /v1/chat/completions` endpoint.
///
/// Every failure (transport, timeout, bad status, malformed body) surfaces
/// as `GenerationFailed`. Generation calls are billed, so this client never
/// retries; callers decide whether a degraded response is possible instead.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatClient {
    pub fn new(cfg: &LlmServiceConfig, model: &str, temperature: f32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: model.to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        debug!(model = %self.model, max_tokens, prompt_chars = prompt.len(), "requesting completion");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::GenerationFailed("language model request timed out".to_string())
                } else {
                    Error::GenerationFailed(format!("language model unreachable: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::GenerationFailed(format!(
                "language model returned {status}: {text}"
            )));
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::GenerationFailed(format!("malformed completion response: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::GenerationFailed("completion response had no choices".into()))?;
        Ok(choice.message.content)
    }
}
