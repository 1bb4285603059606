//! docqa-embed
//!
//! Embedding provider clients. `HttpEmbedder` talks to an OpenAI-style
//! `/v1/embeddings` endpoint; `HashingEmbedder` is a deterministic local
//! stand-in for tests and offline development, selected with
//! `APP_USE_FAKE_EMBEDDINGS=1`.

pub mod hashing;
pub mod http;

use docqa_core::config::ServicesConfig;
use docqa_core::error::Result;
use docqa_core::traits::Embedder;
use tracing::info;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn embedder_from_config(services: &ServicesConfig) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!(dim = services.embedding.dim, "using deterministic hashing embedder");
        return Ok(Box::new(HashingEmbedder::new(services.embedding.dim)));
    }
    Ok(Box::new(HttpEmbedder::new(
        &services.embedding,
        services.retry.clone(),
    )?))
}
