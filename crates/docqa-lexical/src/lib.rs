//! docqa-lexical
//!
//! Tantivy-backed BM25 index over document chunks. The index directory
//! persists chunk text, so the corpus can be reconstructed after a restart
//! without re-running ingestion. See `index` for the engine.

pub mod index;
pub mod tantivy_utils;

pub use index::LexicalIndexer;
