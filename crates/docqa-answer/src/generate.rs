//! Grounded answer generation: prompt construction with labeled sources and
//! citation extraction mapped back to chunk ids.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use docqa_core::error::Result;
use docqa_core::traits::LanguageModel;
use docqa_core::types::{ChunkId, GenerationParams, RetrievalResult};

pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    params: GenerationParams,
}

/// A raw generation outcome before verification.
#[derive(Debug, Clone)]
pub struct Draft {
    pub text: String,
    pub citations: Vec<ChunkId>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, params: GenerationParams) -> Self {
        Self { model, params }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn build_prompt(&self, query: &str, retrieved: &RetrievalResult) -> String {
        let mut prompt = String::from(
            "You are a helpful assistant answering questions about a document.\n\n\
             Answer the question using ONLY the context below. If the context does \
             not contain the answer, say \"I don't have enough information to \
             answer this question.\"\n\
             Keep the answer detailed but concise. Cite the sources you used \
             inline as [Source N] and finish with a \"Sources:\" line listing \
             them.\n\nContext:\n",
        );
        for (i, hit) in retrieved.hits.iter().enumerate() {
            prompt.push_str(&format!(
                "[Source {}: {}]\n{}\n\n",
                i + 1,
                hit.chunk.source_label(),
                hit.chunk.text
            ));
        }
        prompt.push_str(&format!("Question: {query}\n"));
        prompt
    }

    /// Generate a draft answer. Model failures surface as
    /// `GenerationFailed`; callers must not cache them.
    pub async fn generate(&self, query: &str, retrieved: &RetrievalResult) -> Result<Draft> {
        let prompt = self.build_prompt(query, retrieved);
        let text = self.model.complete(&prompt, self.params.max_tokens).await?;
        let citations = extract_citations(&text, retrieved);
        Ok(Draft { text, citations })
    }
}

/// Map `Source N` references in the generated text back to chunk ids, in
/// first-mention order. References to source numbers outside the retrieved
/// set are dropped and logged, never forwarded to the caller.
pub fn extract_citations(text: &str, retrieved: &RetrievalResult) -> Vec<ChunkId> {
    let mut citations = Vec::new();
    let mut seen = HashSet::new();
    for (pos, _) in text.match_indices("Source ") {
        let rest = &text[pos + "Source ".len()..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            continue;
        }
        let Ok(number) = digits.parse::<usize>() else {
            continue;
        };
        match number.checked_sub(1).and_then(|i| retrieved.hits.get(i)) {
            Some(hit) => {
                if seen.insert(hit.chunk.id.clone()) {
                    citations.push(hit.chunk.id.clone());
                }
            }
            None => {
                warn!(number, "dropping citation to unknown source");
            }
        }
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::{Chunk, FusionWeights, RetrievalMethod, ScoredChunk};

    fn retrieved() -> RetrievalResult {
        let hits = vec![
            ScoredChunk {
                chunk: Chunk {
                    id: "doc:0".into(),
                    ordinal: 0,
                    text: "Paris is the capital of France.".into(),
                    page: Some(1),
                    section: None,
                    embedding: None,
                },
                score: 0.9,
                method: RetrievalMethod::Fused,
            },
            ScoredChunk {
                chunk: Chunk {
                    id: "doc:2".into(),
                    ordinal: 2,
                    text: "Berlin is the capital of Germany.".into(),
                    page: Some(2),
                    section: None,
                    embedding: None,
                },
                score: 0.5,
                method: RetrievalMethod::Fused,
            },
        ];
        RetrievalResult::new("capital?", FusionWeights::default(), hits, 5).expect("valid")
    }

    #[test]
    fn citations_map_to_chunk_ids_in_mention_order() {
        let text = "Berlin facts [Source 2]. Paris facts [Source 1].\n\nSources: Source 2, Source 1";
        let citations = extract_citations(text, &retrieved());
        assert_eq!(citations, vec!["doc:2".to_string(), "doc:0".to_string()]);
    }

    #[test]
    fn unknown_source_numbers_are_dropped() {
        let text = "Claim [Source 1] and fabricated [Source 9].\n\nSources: Source 1, Source 9";
        let citations = extract_citations(text, &retrieved());
        assert_eq!(citations, vec!["doc:0".to_string()]);
    }

    #[test]
    fn source_zero_is_dropped() {
        let citations = extract_citations("See [Source 0].", &retrieved());
        assert!(citations.is_empty());
    }

    #[test]
    fn prompt_labels_sources_with_page_numbers() {
        let generator = AnswerGenerator::new(
            Arc::new(NeverModel),
            GenerationParams { model: "m".into(), temperature: 0.0, max_tokens: 64 },
        );
        let prompt = generator.build_prompt("What is the capital of France?", &retrieved());
        assert!(prompt.contains("[Source 1: page 1]"));
        assert!(prompt.contains("Paris is the capital of France."));
        assert!(prompt.contains("Question: What is the capital of France?"));
    }

    struct NeverModel;

    #[async_trait::async_trait]
    impl LanguageModel for NeverModel {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            unreachable!("prompt-building tests never call the model")
        }
    }
}
