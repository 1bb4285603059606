//! `RagService`: the serving boundary. `build_index` ingests chunks under an
//! exclusive write lock; `answer` runs retrieve → cache → generate → verify
//! under a shared read lock, so queries serve concurrently but never against
//! a partially built index.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use docqa_core::config::AppConfig;
use docqa_core::error::{Error, Result};
use docqa_core::metrics::{Metrics, MetricsSnapshot, Service};
use docqa_core::traits::{Embedder, LanguageModel, LexicalIndex, VectorIndex};
use docqa_core::types::{
    AnswerResult, Chunk, FusionWeights, GenerationParams, PresentationMode, RetrievalResult,
};

use crate::cache::{CacheStats, ResponseCache};
use crate::generate::{AnswerGenerator, Draft};
use crate::retrieve::HybridRetriever;
use crate::verify::{fallback_text, warned_text, HallucinationChecker};

struct IndexState<L, V>
where
    L: LexicalIndex,
    V: VectorIndex,
{
    retriever: HybridRetriever<L, V>,
    ready: bool,
}

pub struct RagService<L, V>
where
    L: LexicalIndex,
    V: VectorIndex,
{
    state: RwLock<IndexState<L, V>>,
    generator: AnswerGenerator,
    checker: HallucinationChecker,
    cache: ResponseCache,
    metrics: Arc<Metrics>,
    top_k: usize,
    weights: FusionWeights,
}

impl<L, V> RagService<L, V>
where
    L: LexicalIndex,
    V: VectorIndex,
{
    /// Compose the pipeline. `config` is assumed validated (see
    /// `AppConfig::load`).
    pub fn new(
        lexical: L,
        vector: V,
        embedder: Box<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let reranker = config
            .retrieval
            .rerank
            .then(|| Arc::clone(&model));
        let retriever = HybridRetriever::new(
            lexical,
            vector,
            embedder,
            reranker,
            config.retrieval.fetch_multiplier,
            Arc::clone(&metrics),
        );
        let params = GenerationParams {
            model: config.generation.model.clone(),
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
        };
        Self {
            state: RwLock::new(IndexState { retriever, ready: false }),
            generator: AnswerGenerator::new(Arc::clone(&model), params),
            checker: HallucinationChecker::new(model, config.verification.clone()),
            cache: ResponseCache::new(config.cache.capacity),
            metrics,
            top_k: config.retrieval.top_k,
            weights: config.retrieval.weights,
        }
    }

    /// Ingest `chunks`, holding exclusive write access for the whole build.
    /// The state is marked not-ready first, so a build aborted mid-flight
    /// leaves `NotReady` behind rather than a partially built index.
    pub async fn build_index(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Err(Error::Validation("cannot build an index over zero chunks".into()));
        }
        let count = chunks.len();
        let mut state = self.state.write().await;
        state.ready = false;
        state.retriever.index(chunks).await?;
        state.ready = true;
        info!(chunks = count, "index built");
        Ok(())
    }

    /// Reinstall the chunk table after a restart where both index stores are
    /// already populated (lexical on disk, vectors in the external database).
    pub async fn restore(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Err(Error::EmptyIndex);
        }
        let count = chunks.len();
        let mut state = self.state.write().await;
        state.retriever.restore_chunks(chunks);
        state.ready = true;
        info!(chunks = count, "index state restored");
        Ok(())
    }

    /// Answer one query. Errors with `NotReady` while ingestion holds the
    /// index or before any index was built.
    pub async fn answer(&self, query: &str) -> Result<AnswerResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        self.metrics.record_query();

        let state = self.state.try_read().map_err(|_| Error::NotReady)?;
        if !state.ready {
            return Err(Error::NotReady);
        }

        let retrieved = state.retriever.retrieve(query, self.top_k, self.weights).await?;
        let key = ResponseCache::fingerprint(query, &retrieved.chunk_ids(), self.generator.params());
        if let Some(answer) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            debug!(query, "cache hit");
            return Ok(answer);
        }
        self.metrics.record_cache_miss();

        let draft = self
            .generator
            .generate(query, &retrieved)
            .await
            .map_err(|e| {
                self.metrics.record_service_error(Service::Llm);
                e
            })?;

        let answer = self.finalize(query, draft, &retrieved).await;
        self.metrics.record_confidence(answer.confidence);
        self.metrics.record_presentation(answer.mode);
        // only successful generations are cached
        self.cache.put(key, answer.clone());
        Ok(answer)
    }

    async fn finalize(&self, query: &str, draft: Draft, retrieved: &RetrievalResult) -> AnswerResult {
        if !self.checker.enabled() {
            return AnswerResult {
                text: draft.text,
                citations: draft.citations,
                claims: Vec::new(),
                confidence: 1.0,
                mode: PresentationMode::Direct,
            };
        }
        match self.checker.verify(query, &draft.text, retrieved).await {
            Ok(verification) => {
                let mode = self.checker.decide(verification.confidence);
                let (text, citations) = match mode {
                    PresentationMode::Direct => (draft.text, draft.citations),
                    PresentationMode::Warned => {
                        (warned_text(&draft.text, &verification.claims), draft.citations)
                    }
                    PresentationMode::Fallback => {
                        // the draft stays out of the payload; keep it in the
                        // logs for operators
                        debug!(query, draft = %draft.text, "withholding low-confidence draft");
                        (fallback_text(query, verification.confidence), Vec::new())
                    }
                };
                AnswerResult {
                    text,
                    citations,
                    claims: verification.claims,
                    confidence: verification.confidence,
                    mode,
                }
            }
            Err(e) => {
                warn!(error = %e, "claim verification unavailable, presenting warned answer");
                self.metrics.record_service_error(Service::Llm);
                AnswerResult {
                    text: format!(
                        "{}\n\nCaution: this answer could not be verified against the document.",
                        draft.text
                    ),
                    citations: draft.citations,
                    claims: Vec::new(),
                    confidence: 0.0,
                    mode: PresentationMode::Warned,
                }
            }
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn corpus_len(&self) -> usize {
        self.state.read().await.retriever.corpus_len()
    }
}
