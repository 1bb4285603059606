//! LRU response cache keyed by a stable fingerprint of
//! (query, ordered context chunk ids, generation parameters).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use docqa_core::types::{AnswerResult, ChunkId, GenerationParams};

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub answer: AnswerResult,
    pub created_at: DateTime<Utc>,
    pub hits: u64,
}

pub struct ResponseCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Stable fingerprint: every field is length-delimited before hashing so
    /// concatenation can never be ambiguous, and the chunk id list keeps its
    /// order. Identical inputs always produce identical keys.
    pub fn fingerprint(query: &str, context: &[ChunkId], params: &GenerationParams) -> String {
        let mut hasher = blake3::Hasher::new();
        let mut field = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(query.as_bytes());
        for id in context {
            field(id.as_bytes());
        }
        field(params.model.as_bytes());
        field(&params.temperature.to_bits().to_le_bytes());
        field(&params.max_tokens.to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Look up a cached answer, promoting the entry to most-recently-used.
    pub fn get(&self, key: &str) -> Option<AnswerResult> {
        let mut guard = self.inner.lock();
        match guard.get_mut(key) {
            Some(entry) => {
                entry.hits += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.answer.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert an answer, evicting the least-recently-used entry when the
    /// cache is at capacity.
    pub fn put(&self, key: String, answer: AnswerResult) {
        let mut guard = self.inner.lock();
        guard.put(key, CacheEntry { answer, created_at: Utc::now(), hits: 0 });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let guard = self.inner.lock();
        CacheStats {
            hits,
            misses,
            size: guard.len(),
            capacity: guard.cap().get(),
            hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }
}
