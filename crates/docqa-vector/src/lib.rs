//! docqa-vector
//!
//! Embedding Index Adapter: `RestVectorIndex` wraps an external,
//! collection-addressed vector database (upsert-by-id, top-k cosine query);
//! `MemoryVectorIndex` implements the same trait in-process for tests and
//! offline development.

pub mod memory;
pub mod rest;

pub use memory::MemoryVectorIndex;
pub use rest::RestVectorIndex;
