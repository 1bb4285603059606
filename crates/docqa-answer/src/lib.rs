//! docqa-answer
//!
//! The question-answering pipeline: hybrid retrieval with weighted score
//! fusion and optional LLM reranking, an LRU response cache, grounded answer
//! generation with citation binding, post-hoc claim verification, and the
//! `RagService` serving facade that ties them together.

pub mod cache;
pub mod generate;
pub mod retrieve;
pub mod service;
pub mod verify;

pub use cache::ResponseCache;
pub use generate::AnswerGenerator;
pub use retrieve::HybridRetriever;
pub use service::RagService;
pub use verify::HallucinationChecker;
