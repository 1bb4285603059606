use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use docqa_core::error::{Error, Result};
use docqa_core::traits::LanguageModel;

/// Deterministic language model double: maps prompt substrings to fixed
/// completions, first matching rule wins. Counts invocations so tests can
/// assert on cache behavior.
#[derive(Default)]
pub struct StubModel {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `completion` whenever the prompt contains `needle`.
    pub fn with_rule(mut self, needle: impl Into<String>, completion: impl Into<String>) -> Self {
        self.rules.push((needle.into(), completion.into()));
        self
    }

    /// Respond with `completion` when no rule matches.
    pub fn with_fallback(mut self, completion: impl Into<String>) -> Self {
        self.fallback = Some(completion.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (needle, completion) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return Ok(completion.clone());
            }
        }
        self.fallback
            .clone()
            .ok_or_else(|| Error::GenerationFailed("no stub rule matched the prompt".to_string()))
    }
}

/// A model that always fails; used to exercise degradation paths.
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        Err(Error::GenerationFailed("model deliberately unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let model = StubModel::new()
            .with_rule("alpha", "first")
            .with_rule("alpha beta", "second");
        let out = model.complete("prompt with alpha beta", 64).await.expect("rule");
        assert_eq!(out, "first");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn unmatched_prompt_without_fallback_errors() {
        let model = StubModel::new().with_rule("alpha", "first");
        let err = model.complete("no match here", 64).await.unwrap_err();
        assert!(matches!(err, Error::GenerationFailed(_)));
    }
}
