use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use docqa_core::error::{Error, Result};
use docqa_core::traits::VectorIndex;
use docqa_core::types::{Chunk, ChunkId, RetrievalMethod, SearchHit};

/// Exact-cosine in-process implementation of the vector index trait. Used by
/// tests and offline mode; mirrors the external adapter's contract, including
/// `IndexNotFound` before `ensure` is called.
#[derive(Default)]
pub struct MemoryVectorIndex {
    inner: RwLock<Option<HashMap<ChunkId, Vec<f32>>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure(&self, _dim: usize) -> Result<()> {
        *self.inner.write() = Some(HashMap::new());
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Internal(format!(
                "{} chunks but {} embeddings in upsert",
                chunks.len(),
                embeddings.len()
            )));
        }
        let mut guard = self.inner.write();
        let map = guard
            .as_mut()
            .ok_or_else(|| Error::IndexNotFound("memory".to_string()))?;
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            map.insert(chunk.id.clone(), embedding.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let guard = self.inner.read();
        let map = guard
            .as_ref()
            .ok_or_else(|| Error::IndexNotFound("memory".to_string()))?;
        let mut hits: Vec<SearchHit> = map
            .iter()
            .map(|(id, vector)| SearchHit {
                id: id.clone(),
                score: cosine(embedding, vector),
                method: RetrievalMethod::Vector,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
