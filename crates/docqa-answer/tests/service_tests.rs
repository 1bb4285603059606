use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use docqa_answer::RagService;
use docqa_core::config::AppConfig;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{Embedder, LanguageModel};
use docqa_core::types::{Chunk, FusionWeights, PresentationMode};
use docqa_embed::HashingEmbedder;
use docqa_lexical::LexicalIndexer;
use docqa_llm::StubModel;
use docqa_vector::MemoryVectorIndex;

const QUESTION: &str = "What is the capital of France?";

fn chunk(id: &str, ordinal: usize, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        ordinal,
        text: text.to_string(),
        page: Some(ordinal as u32 + 1),
        section: None,
        embedding: None,
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("doc:0", 0, "Paris is the capital of France."),
        chunk("doc:1", 1, "The Eiffel Tower is in Paris."),
        chunk("doc:2", 2, "Berlin is the capital of Germany."),
    ]
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retrieval.top_k = 2;
    config.retrieval.weights = FusionWeights { lexical: 0.5, vector: 0.5 };
    config.retrieval.rerank = false;
    config.verification.low_threshold = 0.4;
    config.verification.high_threshold = 0.8;
    config.cache.capacity = 16;
    config.validate().expect("test config is valid");
    config
}

fn service_with(
    tmp: &TempDir,
    model: Arc<dyn LanguageModel>,
    config: &AppConfig,
) -> RagService<LexicalIndexer, MemoryVectorIndex> {
    let lexical = LexicalIndexer::create(tmp.path().join("lexical")).expect("lexical");
    RagService::new(
        lexical,
        MemoryVectorIndex::new(),
        Box::new(HashingEmbedder::new(64)),
        model,
        config,
    )
}

fn grounded_stub() -> StubModel {
    StubModel::new()
        .with_rule(
            "helpful assistant",
            "Paris is the capital of France. [Source 1]\n\nSources: Source 1",
        )
        .with_rule(
            "critical evaluator",
            r#"[{"claim": 1, "supported": true, "confidence": 0.95}]"#,
        )
}

#[tokio::test]
async fn answer_before_build_is_not_ready() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(&tmp, Arc::new(grounded_stub()), &test_config());
    let err = service.answer(QUESTION).await.unwrap_err();
    assert!(matches!(err, Error::NotReady));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(&tmp, Arc::new(grounded_stub()), &test_config());
    service.build_index(corpus()).await.expect("build");
    let err = service.answer("   ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn end_to_end_direct_answer_with_citation() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(&tmp, Arc::new(grounded_stub()), &test_config());
    service.build_index(corpus()).await.expect("build");

    let answer = service.answer(QUESTION).await.expect("answer");
    assert_eq!(answer.mode, PresentationMode::Direct);
    assert!(answer.confidence >= 0.8, "confidence {} is high", answer.confidence);
    assert_eq!(answer.citations, vec!["doc:0".to_string()], "cites the France chunk");
    assert!(answer.text.contains("Paris is the capital of France."));
    assert_eq!(answer.claims.len(), 1);
    assert!(answer.claims[0].supported);
    assert!(answer.claims[0].checked_against.contains(&"doc:0".to_string()));
}

#[tokio::test]
async fn identical_query_hits_the_cache_with_identical_answer() {
    let tmp = TempDir::new().unwrap();
    let stub = Arc::new(grounded_stub());
    let model: Arc<dyn LanguageModel> = stub.clone();
    let service = service_with(&tmp, model, &test_config());
    service.build_index(corpus()).await.expect("build");

    let first = service.answer(QUESTION).await.expect("first answer");
    let calls_after_first = stub.calls();
    assert_eq!(calls_after_first, 2, "one generation call, one verification call");

    let second = service.answer(QUESTION).await.expect("second answer");
    assert_eq!(first, second, "cached answer is identical");
    assert_eq!(stub.calls(), calls_after_first, "no model calls on a cache hit");

    let metrics = service.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(service.cache_stats().size, 1);
}

#[tokio::test]
async fn citations_to_unknown_sources_never_reach_the_result() {
    let tmp = TempDir::new().unwrap();
    let stub = StubModel::new()
        .with_rule(
            "helpful assistant",
            "Paris is the capital of France. [Source 1] It has ten moons. [Source 9]\n\nSources: Source 1, Source 9",
        )
        .with_rule(
            "critical evaluator",
            r#"[{"claim": 1, "supported": true, "confidence": 0.9},
                {"claim": 2, "supported": true, "confidence": 0.9}]"#,
        );
    let service = service_with(&tmp, Arc::new(stub), &test_config());
    service.build_index(corpus()).await.expect("build");

    let answer = service.answer(QUESTION).await.expect("answer");
    assert_eq!(answer.citations, vec!["doc:0".to_string()]);
    let known: Vec<String> = corpus().into_iter().map(|c| c.id).collect();
    for citation in &answer.citations {
        assert!(known.contains(citation), "citation {citation} is a retrieved chunk");
    }
}

#[tokio::test]
async fn unsupported_claims_produce_warned_presentation() {
    let tmp = TempDir::new().unwrap();
    let stub = StubModel::new()
        .with_rule(
            "helpful assistant",
            "Paris is the capital of France. The city has exactly one museum.\n\nSources: Source 1",
        )
        .with_rule(
            "critical evaluator",
            r#"[{"claim": 1, "supported": true, "confidence": 0.9},
                {"claim": 2, "supported": false, "confidence": 0.5}]"#,
        );
    let service = service_with(&tmp, Arc::new(stub), &test_config());
    service.build_index(corpus()).await.expect("build");

    let answer = service.answer(QUESTION).await.expect("answer");
    assert_eq!(answer.mode, PresentationMode::Warned);
    assert!((answer.confidence - 0.5).abs() < 1e-6, "worst claim dominates");
    assert!(answer.text.contains("could not be verified"));
    assert!(answer.text.contains("The city has exactly one museum."));
}

#[tokio::test]
async fn low_confidence_substitutes_fallback_refusal() {
    let tmp = TempDir::new().unwrap();
    let stub = StubModel::new()
        .with_rule(
            "helpful assistant",
            "France has twelve oceans bordering it.\n\nSources: Source 1",
        )
        .with_rule(
            "critical evaluator",
            r#"[{"claim": 1, "supported": false, "confidence": 0.1}]"#,
        );
    let service = service_with(&tmp, Arc::new(stub), &test_config());
    service.build_index(corpus()).await.expect("build");

    let answer = service.answer(QUESTION).await.expect("fallback is a successful response");
    assert_eq!(answer.mode, PresentationMode::Fallback);
    assert!(answer.confidence < 0.4);
    assert!(answer.text.contains("I don't have enough reliable information"));
    assert!(
        !answer.text.contains("twelve oceans"),
        "the low-confidence draft is withheld"
    );
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn verification_outage_degrades_to_warned() {
    let tmp = TempDir::new().unwrap();
    // generation succeeds, verification prompt matches no rule and errors
    let stub = StubModel::new().with_rule(
        "helpful assistant",
        "Paris is the capital of France.\n\nSources: Source 1",
    );
    let service = service_with(&tmp, Arc::new(stub), &test_config());
    service.build_index(corpus()).await.expect("build");

    let answer = service.answer(QUESTION).await.expect("answer");
    assert_eq!(answer.mode, PresentationMode::Warned);
    assert!(answer.text.contains("could not be verified"));
    assert!(answer.claims.is_empty());
}

#[tokio::test]
async fn failed_generation_is_surfaced_and_never_cached() {
    let tmp = TempDir::new().unwrap();
    // no rules at all: every generation attempt fails
    let stub = Arc::new(StubModel::new());
    let model: Arc<dyn LanguageModel> = stub.clone();
    let service = service_with(&tmp, model, &test_config());
    service.build_index(corpus()).await.expect("build");

    let err = service.answer(QUESTION).await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailed(_)));
    assert_eq!(service.cache_stats().size, 0, "failed generation is not cached");

    let err = service.answer(QUESTION).await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailed(_)));
    assert_eq!(stub.calls(), 2, "each attempt reaches the model, no cache involvement");
}

/// Embedder that parks inside `embed_batch` until released, so a test can
/// observe the service while ingestion holds the write lock.
struct BlockingEmbedder {
    started: Arc<Notify>,
    release: Arc<Notify>,
    inner: HashingEmbedder,
}

#[async_trait]
impl Embedder for BlockingEmbedder {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.started.notify_one();
        self.release.notified().await;
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn query_during_ingestion_is_not_ready() {
    let tmp = TempDir::new().unwrap();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let embedder = BlockingEmbedder {
        started: started.clone(),
        release: release.clone(),
        inner: HashingEmbedder::new(64),
    };

    let lexical = LexicalIndexer::create(tmp.path().join("lexical")).expect("lexical");
    let service = Arc::new(RagService::new(
        lexical,
        MemoryVectorIndex::new(),
        Box::new(embedder),
        Arc::new(grounded_stub()),
        &test_config(),
    ));

    let build = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.build_index(corpus()).await })
    };
    started.notified().await;

    let err = service.answer(QUESTION).await.unwrap_err();
    assert!(matches!(err, Error::NotReady), "mid-ingestion query never sees a partial index");

    release.notify_one();
    build.await.expect("join").expect("build");

    let answer = service.answer(QUESTION).await.expect("answer after ingestion");
    assert_eq!(answer.mode, PresentationMode::Direct);
}
