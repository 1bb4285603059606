//! docqa-llm
//!
//! Language model provider. `ChatClient` talks to an OpenAI-style
//! `/v1/chat/completions` endpoint; `StubModel`/`FailingModel` are
//! deterministic doubles for tests (live models are never exercised in the
//! test suite).

pub mod http;
pub mod stub;

pub use http::ChatClient;
pub use stub::{FailingModel, StubModel};
