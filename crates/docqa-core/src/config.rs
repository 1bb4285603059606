//! Typed configuration loaded through Figment.
//!
//! Merges `config.toml` + `config.<env>.toml` + `APP_*` env vars (nested keys
//! split on `__`, e.g. `APP_RETRIEVAL__TOP_K=8`) and extracts the result into
//! named, validated fields. Out-of-range values are rejected at load time,
//! not discovered mid-request.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::FusionWeights;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks returned to the generator.
    pub top_k: usize,
    /// Each method is asked for `top_k * fetch_multiplier` candidates to
    /// leave fusion headroom.
    pub fetch_multiplier: usize,
    pub weights: FusionWeights,
    /// Enable the LLM contextual-compression reranking stage.
    pub rerank: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            fetch_multiplier: 2,
            weights: FusionWeights::default(),
            rerank: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

/// Policy for combining per-claim confidences into an overall score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceAggregation {
    /// Worst claim dominates: one unsupported claim undermines the answer.
    Minimum,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
    /// Below this the answer is replaced by a safe refusal.
    pub low_threshold: f32,
    /// At or above this the answer is shown as-is.
    pub high_threshold: f32,
    pub aggregation: ConfidenceAggregation,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_threshold: 0.4,
            high_threshold: 0.8,
            aggregation: ConfidenceAggregation::Minimum,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dim: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dim: 1536,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for VectorServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            api_key: String::new(),
            collection: "docqa".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for LlmServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicesConfig {
    pub embedding: EmbeddingServiceConfig,
    pub vector: VectorServiceConfig,
    pub llm: LlmServiceConfig,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the persisted lexical index.
    pub lexical_index_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { lexical_index_dir: "./data/indexes/lexical".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub verification: VerificationConfig,
    pub cache: CacheConfig,
    pub services: ServicesConfig,
    pub data: DataConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| Error::Validation(format!("failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.retrieval.weights.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(Error::Validation("retrieval.top_k must be at least 1".into()));
        }
        if self.retrieval.fetch_multiplier == 0 {
            return Err(Error::Validation(
                "retrieval.fetch_multiplier must be at least 1".into(),
            ));
        }
        let v = &self.verification;
        if !(0.0..=1.0).contains(&v.low_threshold) || !(0.0..=1.0).contains(&v.high_threshold) {
            return Err(Error::Validation(
                "verification thresholds must lie in [0, 1]".into(),
            ));
        }
        if v.low_threshold > v.high_threshold {
            return Err(Error::Validation(
                "verification.low_threshold must not exceed high_threshold".into(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Validation("cache.capacity must be at least 1".into()));
        }
        if self.generation.max_tokens == 0 {
            return Err(Error::Validation("generation.max_tokens must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(Error::Validation(
                "generation.temperature must lie in [0, 2]".into(),
            ));
        }
        if self.services.embedding.dim == 0 {
            return Err(Error::Validation("services.embedding.dim must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after
/// expansion. Absolute paths are returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn rejects_bad_weights() {
        let mut cfg = AppConfig::default();
        cfg.retrieval.weights = FusionWeights { lexical: 0.9, vector: 0.9 };
        assert!(matches!(cfg.validate(), Err(Error::InvalidWeights { .. })));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut cfg = AppConfig::default();
        cfg.verification.low_threshold = 0.9;
        cfg.verification.high_threshold = 0.5;
        assert!(matches!(cfg.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut cfg = AppConfig::default();
        cfg.verification.high_threshold = 1.5;
        assert!(matches!(cfg.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_zero_cache_capacity() {
        let mut cfg = AppConfig::default();
        cfg.cache.capacity = 0;
        assert!(matches!(cfg.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_zero_top_k() {
        let mut cfg = AppConfig::default();
        cfg.retrieval.top_k = 0;
        assert!(matches!(cfg.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn expand_path_handles_plain_paths() {
        assert_eq!(expand_path("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
