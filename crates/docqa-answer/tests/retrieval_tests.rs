use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa_answer::HybridRetriever;
use docqa_core::error::{Error, Result};
use docqa_core::metrics::Metrics;
use docqa_core::traits::{LexicalIndex, VectorIndex};
use docqa_core::types::{Chunk, FusionWeights, RetrievalMethod, SearchHit};
use docqa_embed::HashingEmbedder;
use docqa_lexical::LexicalIndexer;
use docqa_llm::{FailingModel, StubModel};
use docqa_vector::MemoryVectorIndex;

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

async fn build_retriever(
    tmp: &TempDir,
) -> HybridRetriever<LexicalIndexer, MemoryVectorIndex> {
    let lexical = LexicalIndexer::create(tmp.path().join("lexical")).expect("lexical");
    let mut retriever = HybridRetriever::new(
        lexical,
        MemoryVectorIndex::new(),
        Box::new(HashingEmbedder::new(64)),
        None,
        2,
        Arc::new(Metrics::new()),
    );
    retriever.index(corpus()).await.expect("index");
    retriever
}

#[tokio::test]
async fn fused_results_satisfy_invariants_for_all_weightings() {
    let tmp = TempDir::new().unwrap();
    let retriever = build_retriever(&tmp).await;
    let weight_pairs = [
        (1.0, 0.0),
        (0.7, 0.3),
        (0.5, 0.5),
        (0.3, 0.7),
        (0.0, 1.0),
    ];
    for (lexical, vector) in weight_pairs {
        let result = retriever
            .retrieve("What is the capital of France?", 2, FusionWeights { lexical, vector })
            .await
            .expect("retrieve");
        assert!(result.hits.len() <= 2, "at most k results for weights {lexical}/{vector}");
        let ids: HashSet<&str> = result.hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids.len(), result.hits.len(), "no duplicate chunk ids");
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score, "scores non-increasing");
        }
    }
}

#[tokio::test]
async fn half_and_half_ranks_answer_chunk_first() {
    let tmp = TempDir::new().unwrap();
    let retriever = build_retriever(&tmp).await;
    let result = retriever
        .retrieve(
            "What is the capital of France?",
            2,
            FusionWeights { lexical: 0.5, vector: 0.5 },
        )
        .await
        .expect("retrieve");
    assert_eq!(result.hits[0].chunk.id, "doc:0");
    assert_eq!(result.hits[0].method, RetrievalMethod::Fused);
}

#[tokio::test]
async fn pure_lexical_weights_reproduce_lexical_ranking() {
    let tmp = TempDir::new().unwrap();
    let retriever = build_retriever(&tmp).await;

    // an independent lexical index over the same corpus gives the expectation
    let reference = LexicalIndexer::create(tmp.path().join("reference")).expect("lexical");
    reference.index(&corpus()).expect("index");
    let expected: Vec<String> = reference
        .query("What is the capital of France?", 2)
        .expect("query")
        .into_iter()
        .map(|h| h.id)
        .collect();

    let result = retriever
        .retrieve(
            "What is the capital of France?",
            2,
            FusionWeights { lexical: 1.0, vector: 0.0 },
        )
        .await
        .expect("retrieve");
    let got: Vec<String> = result.hits.iter().map(|h| h.chunk.id.clone()).collect();
    assert_eq!(got, expected, "order and membership match the lexical index");
}

#[tokio::test]
async fn invalid_weights_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let retriever = build_retriever(&tmp).await;
    let err = retriever
        .retrieve("anything", 2, FusionWeights { lexical: 0.7, vector: 0.7 })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWeights { .. }));
}

/// Vector store whose queries always fail with a service error.
struct DownVectorIndex;

#[async_trait]
impl VectorIndex for DownVectorIndex {
    async fn ensure(&self, _dim: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _chunks: &[Chunk], _embeddings: &[Vec<f32>]) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<SearchHit>> {
        Err(Error::ServiceUnavailable {
            service: "vector database".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

#[tokio::test]
async fn vector_outage_degrades_to_lexical_only() {
    let tmp = TempDir::new().unwrap();
    let lexical = LexicalIndexer::create(tmp.path().join("lexical")).expect("lexical");
    let mut retriever = HybridRetriever::new(
        lexical,
        DownVectorIndex,
        Box::new(HashingEmbedder::new(64)),
        None,
        2,
        Arc::new(Metrics::new()),
    );
    retriever.index(corpus()).await.expect("index");

    let result = retriever
        .retrieve(
            "What is the capital of France?",
            2,
            FusionWeights { lexical: 0.5, vector: 0.5 },
        )
        .await
        .expect("degraded retrieval still succeeds");
    assert!(!result.hits.is_empty());
    assert_eq!(result.hits[0].chunk.id, "doc:0");
    for hit in &result.hits {
        assert_eq!(hit.method, RetrievalMethod::Lexical);
    }
}

#[tokio::test]
async fn reranker_trims_but_never_reorders() {
    let tmp = TempDir::new().unwrap();
    let lexical = LexicalIndexer::create(tmp.path().join("lexical")).expect("lexical");
    let reranker: Arc<dyn docqa_core::traits::LanguageModel> = Arc::new(
        StubModel::new().with_rule("Reply with the numbers of the sources", "2"),
    );
    let mut retriever = HybridRetriever::new(
        lexical,
        MemoryVectorIndex::new(),
        Box::new(HashingEmbedder::new(64)),
        Some(reranker),
        2,
        Arc::new(Metrics::new()),
    );
    retriever.index(corpus()).await.expect("index");

    let baseline_tmp = TempDir::new().unwrap();
    let baseline = build_retriever(&baseline_tmp).await;
    let fused = baseline
        .retrieve("What is the capital of France?", 2, FusionWeights { lexical: 0.5, vector: 0.5 })
        .await
        .expect("fused");

    let result = retriever
        .retrieve("What is the capital of France?", 2, FusionWeights { lexical: 0.5, vector: 0.5 })
        .await
        .expect("reranked");
    assert_eq!(result.hits.len(), 1, "compression only trims");
    assert_eq!(result.hits[0].chunk.id, fused.hits[1].chunk.id);
    assert!((result.hits[0].score - fused.hits[1].score).abs() < 1e-6, "scores preserved");
}

#[tokio::test]
async fn reranker_failure_falls_back_to_fused_ranking() {
    let tmp = TempDir::new().unwrap();
    let lexical = LexicalIndexer::create(tmp.path().join("lexical")).expect("lexical");
    let reranker: Arc<dyn docqa_core::traits::LanguageModel> = Arc::new(FailingModel);
    let mut retriever = HybridRetriever::new(
        lexical,
        MemoryVectorIndex::new(),
        Box::new(HashingEmbedder::new(64)),
        Some(reranker),
        2,
        Arc::new(Metrics::new()),
    );
    retriever.index(corpus()).await.expect("index");

    let baseline_tmp = TempDir::new().unwrap();
    let baseline = build_retriever(&baseline_tmp).await;
    let fused = baseline
        .retrieve("What is the capital of France?", 2, FusionWeights { lexical: 0.5, vector: 0.5 })
        .await
        .expect("fused");

    let result = retriever
        .retrieve("What is the capital of France?", 2, FusionWeights { lexical: 0.5, vector: 0.5 })
        .await
        .expect("fallback");
    let got: Vec<&str> = result.hits.iter().map(|h| h.chunk.id.as_str()).collect();
    let expected: Vec<&str> = fused.hits.iter().map(|h| h.chunk.id.as_str()).collect();
    assert_eq!(got, expected, "pre-rerank fused ranking survives reranker failure");
}
