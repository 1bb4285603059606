//! Hybrid retrieval: fuse lexical and vector rankings into one ordered
//! result set, with optional LLM contextual-compression reranking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use docqa_core::error::{Error, Result};
use docqa_core::metrics::{Metrics, Service};
use docqa_core::traits::{Embedder, LanguageModel, LexicalIndex, VectorIndex};
use docqa_core::types::{
    Chunk, ChunkId, FusionWeights, RetrievalMethod, RetrievalResult, ScoredChunk, SearchHit,
};

/// Floor for normalized scores: a method's worst candidate stays
/// distinguishable from candidates the method never returned at all.
const MIN_NORM: f32 = 1e-6;

pub struct HybridRetriever<L, V>
where
    L: LexicalIndex,
    V: VectorIndex,
{
    lexical: L,
    vector: V,
    embedder: Box<dyn Embedder>,
    reranker: Option<Arc<dyn LanguageModel>>,
    chunks: HashMap<ChunkId, Chunk>,
    fetch_multiplier: usize,
    metrics: Arc<Metrics>,
}

/// Min-max scale scores within one candidate set. Equal min and max (or a
/// single candidate) maps everything to 1.0.
fn normalize(hits: &[SearchHit]) -> Vec<f32> {
    let min = hits.iter().map(|h| h.score).fold(f32::INFINITY, f32::min);
    let max = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() || (max - min) <= f32::EPSILON {
        return vec![1.0; hits.len()];
    }
    hits.iter()
        .map(|h| ((h.score - min) / (max - min)).max(MIN_NORM))
        .collect()
}

struct FusedEntry {
    score: f32,
    lexical_rank: Option<usize>,
}

impl<L, V> HybridRetriever<L, V>
where
    L: LexicalIndex,
    V: VectorIndex,
{
    pub fn new(
        lexical: L,
        vector: V,
        embedder: Box<dyn Embedder>,
        reranker: Option<Arc<dyn LanguageModel>>,
        fetch_multiplier: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            lexical,
            vector,
            embedder,
            reranker,
            chunks: HashMap::new(),
            fetch_multiplier: fetch_multiplier.max(1),
            metrics,
        }
    }

    /// Rebuild both indexes over `chunks`, replacing the previous corpus.
    /// Precomputed chunk embeddings are used as-is; the rest are batched
    /// through the embedding provider.
    pub async fn index(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        let embeddings = self.resolve_embeddings(&chunks).await?;
        self.vector.ensure(self.embedder.dim()).await?;
        self.vector.upsert(&chunks, &embeddings).await?;
        self.lexical.index(&chunks)?;
        self.chunks = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(())
    }

    /// Install a chunk table without reindexing, for restarts where both
    /// index stores are already populated.
    pub fn restore_chunks(&mut self, chunks: Vec<Chunk>) {
        self.chunks = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    pub fn corpus_len(&self) -> usize {
        self.chunks.len()
    }

    async fn resolve_embeddings(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut slots: Vec<Option<Vec<f32>>> =
            chunks.iter().map(|c| c.embedding.clone()).collect();
        let missing: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_none().then_some(i))
            .collect();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| chunks[i].text.clone()).collect();
            let embedded = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| self.count_embedding_error(e))?;
            if embedded.len() != texts.len() {
                return Err(Error::Internal(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            for (slot, vector) in missing.into_iter().zip(embedded) {
                slots[slot] = Some(vector);
            }
        }
        let dim = self.embedder.dim();
        slots
            .into_iter()
            .zip(chunks)
            .map(|(slot, chunk)| {
                let vector = slot.ok_or_else(|| {
                    Error::Internal(format!("no embedding resolved for chunk {}", chunk.id))
                })?;
                if vector.len() != dim {
                    return Err(Error::Internal(format!(
                        "chunk {} embedding has {} dims, expected {dim}",
                        chunk.id,
                        vector.len()
                    )));
                }
                Ok(vector)
            })
            .collect()
    }

    fn count_embedding_error(&self, e: Error) -> Error {
        if e.is_retryable() {
            self.metrics.record_service_error(Service::Embedding);
        }
        e
    }

    /// Retrieve the top-`k` chunks for `query` under the given fusion
    /// weights. Vector-side service failures degrade to lexical-only
    /// results; lexical failures are local state errors and propagate.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        weights: FusionWeights,
    ) -> Result<RetrievalResult> {
        let weights = weights.validate()?;
        let m = k.saturating_mul(self.fetch_multiplier).max(k);

        let started = Instant::now();
        let lexical_hits = self.lexical.query(query, m)?;
        self.metrics.record_lexical_query(started.elapsed());

        let vector_hits = match self.vector_candidates(query, m).await {
            Ok(hits) => hits,
            Err(e) if e.is_retryable() || matches!(e, Error::IndexNotFound(_)) => {
                warn!(error = %e, "vector retrieval unavailable, serving lexical-only");
                self.metrics.record_degraded_retrieval();
                return self.lexical_only(query, k, weights, &lexical_hits);
            }
            Err(e) => return Err(e),
        };

        let fused = self.fuse(query, k, weights, &lexical_hits, &vector_hits)?;
        Ok(self.rerank(query, fused, k).await)
    }

    async fn vector_candidates(&self, query: &str, m: usize) -> Result<Vec<SearchHit>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| self.count_embedding_error(e))?;
        let started = Instant::now();
        let hits = self.vector.query(&embedding, m).await.map_err(|e| {
            if e.is_retryable() || matches!(e, Error::IndexNotFound(_)) {
                self.metrics.record_service_error(Service::VectorDb);
            }
            e
        })?;
        self.metrics.record_vector_query(started.elapsed());
        Ok(hits)
    }

    fn fuse(
        &self,
        query: &str,
        k: usize,
        weights: FusionWeights,
        lexical_hits: &[SearchHit],
        vector_hits: &[SearchHit],
    ) -> Result<RetrievalResult> {
        let lexical_norms = normalize(lexical_hits);
        let vector_norms = normalize(vector_hits);

        let mut entries: HashMap<&str, FusedEntry> = HashMap::new();
        for (rank, (hit, norm)) in lexical_hits.iter().zip(&lexical_norms).enumerate() {
            let entry = entries
                .entry(hit.id.as_str())
                .or_insert(FusedEntry { score: 0.0, lexical_rank: None });
            entry.score += weights.lexical * norm;
            entry.lexical_rank = Some(rank);
        }
        for (hit, norm) in vector_hits.iter().zip(&vector_norms) {
            let entry = entries
                .entry(hit.id.as_str())
                .or_insert(FusedEntry { score: 0.0, lexical_rank: None });
            entry.score += weights.vector * norm;
        }

        // A chunk no weighted method scored never enters the ranking.
        let mut ranked: Vec<(&str, FusedEntry)> =
            entries.into_iter().filter(|(_, e)| e.score > 0.0).collect();
        ranked.sort_by(|(id_a, a), (id_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.lexical_rank
                        .unwrap_or(usize::MAX)
                        .cmp(&b.lexical_rank.unwrap_or(usize::MAX))
                })
                .then_with(|| id_a.cmp(id_b))
        });
        ranked.truncate(k);

        let mut hits = Vec::with_capacity(ranked.len());
        for (id, entry) in ranked {
            hits.push(ScoredChunk {
                chunk: self.chunk(id)?,
                score: entry.score,
                method: RetrievalMethod::Fused,
            });
        }
        RetrievalResult::new(query, weights, hits, k)
    }

    fn lexical_only(
        &self,
        query: &str,
        k: usize,
        weights: FusionWeights,
        lexical_hits: &[SearchHit],
    ) -> Result<RetrievalResult> {
        let norms = normalize(lexical_hits);
        let mut hits = Vec::new();
        for (hit, norm) in lexical_hits.iter().zip(norms).take(k) {
            hits.push(ScoredChunk {
                chunk: self.chunk(&hit.id)?,
                score: norm,
                method: RetrievalMethod::Lexical,
            });
        }
        RetrievalResult::new(query, weights, hits, k)
    }

    fn chunk(&self, id: &str) -> Result<Chunk> {
        self.chunks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("retrieved unknown chunk id {id}")))
    }

    /// Contextual-compression pass: ask the model which fused sources are
    /// relevant to the literal query and keep that subset, order and scores
    /// untouched. Never grows the set; any failure falls back to the fused
    /// ranking.
    async fn rerank(&self, query: &str, fused: RetrievalResult, k: usize) -> RetrievalResult {
        let Some(model) = &self.reranker else {
            return fused;
        };
        if fused.hits.is_empty() {
            return fused;
        }
        let prompt = rerank_prompt(query, &fused);
        let reply = match model.complete(&prompt, 64).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reranker call failed, keeping fused ranking");
                self.metrics.record_service_error(Service::Llm);
                return fused;
            }
        };
        let Some(selected) = parse_selection(&reply, fused.hits.len()) else {
            warn!(reply = %reply, "unparseable reranker reply, keeping fused ranking");
            return fused;
        };
        debug!(kept = selected.len(), total = fused.hits.len(), "reranker selection applied");
        let hits: Vec<ScoredChunk> = fused
            .hits
            .iter()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, h)| h.clone())
            .collect();
        match RetrievalResult::new(fused.query.clone(), fused.weights, hits, k) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "reranked result violated invariants, keeping fused ranking");
                fused
            }
        }
    }
}

fn rerank_prompt(query: &str, fused: &RetrievalResult) -> String {
    let mut prompt = String::from(
        "You decide which retrieved sources are relevant to a question.\n\n",
    );
    prompt.push_str(&format!("Question: {query}\n\n"));
    for (i, hit) in fused.hits.iter().enumerate() {
        prompt.push_str(&format!("[Source {}]\n{}\n\n", i + 1, hit.chunk.text));
    }
    prompt.push_str(
        "Reply with the numbers of the sources that contain information relevant \
         to the question, comma-separated (for example: 1, 3). Reply \"none\" if \
         no source is relevant.",
    );
    prompt
}

/// Parse the reranker reply into zero-based hit indices. `None` means the
/// reply was unusable and the caller should keep the fused ranking.
fn parse_selection(reply: &str, len: usize) -> Option<Vec<usize>> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for ch in reply.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            numbers.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        numbers.push(current);
    }

    let mut selected = Vec::new();
    for n in numbers {
        if let Ok(v) = n.parse::<usize>() {
            if v >= 1 && v <= len && !selected.contains(&(v - 1)) {
                selected.push(v - 1);
            }
        }
    }
    if !selected.is_empty() {
        return Some(selected);
    }
    if reply.to_lowercase().contains("none") {
        return Some(Vec::new());
    }
    None
}
