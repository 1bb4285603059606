use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, SearchHit};

/// Embedding provider. An external service: calls may time out or fail and
/// callers should expect occasional transient errors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// In-process lexical (BM25) index over chunks.
pub trait LexicalIndex: Send + Sync {
    /// Rebuild the index over `chunks`, replacing any previous corpus.
    fn index(&self, chunks: &[Chunk]) -> Result<()>;

    /// Top-`k` chunks for `text`. Errors with `EmptyIndex` when the index
    /// holds no documents.
    fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>>;
}

/// Adapter over an external vector database addressed by collection name.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create (or reset) the target collection for vectors of `dim`.
    async fn ensure(&self, dim: usize) -> Result<()>;

    /// Store vectors keyed by chunk id; idempotent on id collision.
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Top-`k` chunks by cosine similarity to `embedding`.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Language model provider: `complete(prompt, max_tokens) -> text`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}
