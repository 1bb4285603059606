//! Domain types shared across the retrieval and answer pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type ChunkId = String;

/// A contiguous span of source-document text, the atomic retrieval unit.
///
/// - `id`: globally unique chunk identifier
/// - `ordinal`: position within the ingested document
/// - `text`: the text payload of the chunk
/// - `page`/`section`: source metadata (page number or section label)
/// - `embedding`: optional precomputed embedding vector
///
/// Chunks are immutable once created and destroyed only on reindexing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub ordinal: usize,
    pub text: String,
    pub page: Option<u32>,
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Human-readable source label used in prompts and citations.
    pub fn source_label(&self) -> String {
        match (&self.page, &self.section) {
            (Some(page), Some(section)) => format!("{section}, page {page}"),
            (Some(page), None) => format!("page {page}"),
            (None, Some(section)) => section.clone(),
            (None, None) => format!("chunk {}", self.ordinal),
        }
    }
}

/// Indicates which retrieval method produced a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Lexical,
    Vector,
    Fused,
}

/// The minimal surface returned by both engines.
///
/// `id` matches `Chunk::id`. `score` is method-specific but higher is
/// always better. `method` labels the origin engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub method: RetrievalMethod,
}

/// A chunk paired with its retrieval score. Created per query, discarded
/// after the request completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub method: RetrievalMethod,
}

/// Weights for fusing lexical and vector rankings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl FusionWeights {
    pub fn validate(self) -> Result<Self> {
        let sum = self.lexical + self.vector;
        if self.lexical < 0.0 || self.vector < 0.0 || (sum - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidWeights {
                lexical: self.lexical,
                vector: self.vector,
            });
        }
        Ok(self)
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { lexical: 0.3, vector: 0.7 }
    }
}

/// An ordered retrieval outcome: hits sorted by score descending, no
/// duplicate chunk ids, at most `k` entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    pub weights: FusionWeights,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Validating constructor. Invariant violations are programming errors
    /// and surface as `Error::Internal` rather than being coerced away.
    pub fn new(
        query: impl Into<String>,
        weights: FusionWeights,
        hits: Vec<ScoredChunk>,
        k: usize,
    ) -> Result<Self> {
        if hits.len() > k {
            return Err(Error::Internal(format!(
                "retrieval produced {} hits for k={k}",
                hits.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for hit in &hits {
            if !hit.score.is_finite() {
                return Err(Error::Internal(format!(
                    "malformed score {} for chunk {}",
                    hit.score, hit.chunk.id
                )));
            }
            if !seen.insert(hit.chunk.id.as_str()) {
                return Err(Error::Internal(format!(
                    "duplicate chunk id {} in retrieval result",
                    hit.chunk.id
                )));
            }
        }
        for pair in hits.windows(2) {
            if pair[0].score < pair[1].score {
                return Err(Error::Internal(format!(
                    "retrieval scores not monotonically non-increasing: {} < {}",
                    pair[0].score, pair[1].score
                )));
            }
        }
        Ok(Self { query: query.into(), weights, hits })
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.hits.iter().map(|h| h.chunk.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// An atomic factual assertion extracted from a generated answer, with the
/// verdict of checking it against the retrieved context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub text: String,
    pub checked_against: Vec<ChunkId>,
    pub supported: bool,
    pub confidence: f32,
}

/// How a verified answer is surfaced to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresentationMode {
    Direct,
    Warned,
    Fallback,
}

/// The final response returned by the serving boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub text: String,
    pub citations: Vec<ChunkId>,
    pub claims: Vec<Claim>,
    pub confidence: f32,
    pub mode: PresentationMode,
}

/// Parameters that shape a generation call. Part of the cache fingerprint:
/// two calls differing in any field must never share a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}
