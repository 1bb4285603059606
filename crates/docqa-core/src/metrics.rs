//! In-process counters for the observability boundary. An external collector
//! consumes `MetricsSnapshot`; no exporter wiring lives here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::types::PresentationMode;

/// External services tracked by the error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    VectorDb,
    Llm,
}

#[derive(Default)]
pub struct Metrics {
    queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    lexical_queries: AtomicU64,
    lexical_latency_us: AtomicU64,
    vector_queries: AtomicU64,
    vector_latency_us: AtomicU64,
    degraded_retrievals: AtomicU64,
    embedding_errors: AtomicU64,
    vector_db_errors: AtomicU64,
    llm_errors: AtomicU64,
    answers_direct: AtomicU64,
    answers_warned: AtomicU64,
    answers_fallback: AtomicU64,
    // confidence distribution: [0, 0.4), [0.4, 0.8), [0.8, 1.0]
    confidence_low: AtomicU64,
    confidence_mid: AtomicU64,
    confidence_high: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lexical_query(&self, elapsed: Duration) {
        self.lexical_queries.fetch_add(1, Ordering::Relaxed);
        self.lexical_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_vector_query(&self, elapsed: Duration) {
        self.vector_queries.fetch_add(1, Ordering::Relaxed);
        self.vector_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_degraded_retrieval(&self) {
        self.degraded_retrievals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_service_error(&self, service: Service) {
        let counter = match service {
            Service::Embedding => &self.embedding_errors,
            Service::VectorDb => &self.vector_db_errors,
            Service::Llm => &self.llm_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presentation(&self, mode: PresentationMode) {
        let counter = match mode {
            PresentationMode::Direct => &self.answers_direct,
            PresentationMode::Warned => &self.answers_warned,
            PresentationMode::Fallback => &self.answers_fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confidence(&self, confidence: f32) {
        let counter = if confidence < 0.4 {
            &self.confidence_low
        } else if confidence < 0.8 {
            &self.confidence_mid
        } else {
            &self.confidence_high
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        MetricsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
            lexical_queries: self.lexical_queries.load(Ordering::Relaxed),
            lexical_latency_us: self.lexical_latency_us.load(Ordering::Relaxed),
            vector_queries: self.vector_queries.load(Ordering::Relaxed),
            vector_latency_us: self.vector_latency_us.load(Ordering::Relaxed),
            degraded_retrievals: self.degraded_retrievals.load(Ordering::Relaxed),
            embedding_errors: self.embedding_errors.load(Ordering::Relaxed),
            vector_db_errors: self.vector_db_errors.load(Ordering::Relaxed),
            llm_errors: self.llm_errors.load(Ordering::Relaxed),
            answers_direct: self.answers_direct.load(Ordering::Relaxed),
            answers_warned: self.answers_warned.load(Ordering::Relaxed),
            answers_fallback: self.answers_fallback.load(Ordering::Relaxed),
            confidence_low: self.confidence_low.load(Ordering::Relaxed),
            confidence_mid: self.confidence_mid.load(Ordering::Relaxed),
            confidence_high: self.confidence_high.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub lexical_queries: u64,
    pub lexical_latency_us: u64,
    pub vector_queries: u64,
    pub vector_latency_us: u64,
    pub degraded_retrievals: u64,
    pub embedding_errors: u64,
    pub vector_db_errors: u64,
    pub llm_errors: u64,
    pub answers_direct: u64,
    pub answers_warned: u64,
    pub answers_fallback: u64,
    pub confidence_low: u64,
    pub confidence_mid: u64,
    pub confidence_high: u64,
}
