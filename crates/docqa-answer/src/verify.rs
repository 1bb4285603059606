//! Post-hoc claim verification: split the generated answer into claims,
//! check each against the retrieved context through a constrained model
//! call, and pick the presentation mode from the configured thresholds.

use std::sync::Arc;

use serde::Deserialize;

use docqa_core::config::{ConfidenceAggregation, VerificationConfig};
use docqa_core::error::{Error, Result};
use docqa_core::traits::LanguageModel;
use docqa_core::types::{Claim, PresentationMode, RetrievalResult};

const MIN_CLAIM_CHARS: usize = 8;

pub struct HallucinationChecker {
    model: Arc<dyn LanguageModel>,
    cfg: VerificationConfig,
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub claims: Vec<Claim>,
    pub confidence: f32,
}

#[derive(Deserialize)]
struct VerdictRow {
    claim: usize,
    supported: bool,
    confidence: f32,
}

impl HallucinationChecker {
    pub fn new(model: Arc<dyn LanguageModel>, cfg: VerificationConfig) -> Self {
        Self { model, cfg }
    }

    pub fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Verify `answer_text` against the retrieved chunks. An answer with no
    /// extractable claims verifies vacuously at confidence 1.0. Model or
    /// parse failures surface as errors so the caller can degrade.
    pub async fn verify(
        &self,
        query: &str,
        answer_text: &str,
        retrieved: &RetrievalResult,
    ) -> Result<Verification> {
        let claim_texts = split_claims(answer_text);
        if claim_texts.is_empty() {
            return Ok(Verification { claims: Vec::new(), confidence: 1.0 });
        }

        let prompt = self.build_prompt(query, &claim_texts, retrieved);
        let max_tokens = (64 * claim_texts.len() as u32).clamp(128, 1024);
        let reply = self.model.complete(&prompt, max_tokens).await?;
        let verdicts = parse_verdicts(&reply)?;

        let checked_against = retrieved.chunk_ids();
        let claims: Vec<Claim> = claim_texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                // claims the reply skipped stay unsupported at zero confidence
                let verdict = verdicts.iter().find(|v| v.claim == i + 1);
                let (supported, confidence) = verdict
                    .map(|v| (v.supported, v.confidence.clamp(0.0, 1.0)))
                    .unwrap_or((false, 0.0));
                Claim { text, checked_against: checked_against.clone(), supported, confidence }
            })
            .collect();

        let confidence = self.aggregate(&claims);
        Ok(Verification { claims, confidence })
    }

    /// Combine per-claim confidences per the configured policy.
    pub fn aggregate(&self, claims: &[Claim]) -> f32 {
        if claims.is_empty() {
            return 1.0;
        }
        let value = match self.cfg.aggregation {
            ConfidenceAggregation::Minimum => claims
                .iter()
                .map(|c| c.confidence)
                .fold(f32::INFINITY, f32::min),
            ConfidenceAggregation::Mean => {
                claims.iter().map(|c| c.confidence).sum::<f32>() / claims.len() as f32
            }
        };
        value.clamp(0.0, 1.0)
    }

    pub fn decide(&self, confidence: f32) -> PresentationMode {
        if confidence >= self.cfg.high_threshold {
            PresentationMode::Direct
        } else if confidence >= self.cfg.low_threshold {
            PresentationMode::Warned
        } else {
            PresentationMode::Fallback
        }
    }

    fn build_prompt(&self, query: &str, claims: &[String], retrieved: &RetrievalResult) -> String {
        let mut prompt = String::from(
            "You are a critical evaluator checking AI-generated answers for \
             claims the source material does not support.\n\nContext from the \
             document:\n",
        );
        for hit in &retrieved.hits {
            prompt.push_str(&format!("{}\n\n", hit.chunk.text));
        }
        prompt.push_str(&format!("Question: {query}\n\nClaims to check:\n"));
        for (i, claim) in claims.iter().enumerate() {
            prompt.push_str(&format!("{}. {claim}\n", i + 1));
        }
        prompt.push_str(
            "\nFor each claim decide whether it is supported by the context and \
             give a confidence between 0.0 and 1.0. Be conservative: mark a claim \
             unsupported only when it clearly states something the context does \
             not.\nReply with a JSON array only, one object per claim, like:\n\
             [{\"claim\": 1, \"supported\": true, \"confidence\": 0.9}]",
        );
        prompt
    }
}

/// Sentence-level claim extraction. Inline `[Source N]` tags are removed and
/// everything from a trailing `Sources:` section on is ignored; fragments
/// shorter than `MIN_CLAIM_CHARS` are dropped.
pub fn split_claims(answer_text: &str) -> Vec<String> {
    let body = answer_text
        .split("Sources:")
        .next()
        .unwrap_or(answer_text);
    let without_tags = strip_source_tags(body);

    let mut claims = Vec::new();
    let mut current = String::new();
    for ch in without_tags.chars() {
        if matches!(ch, '.' | '!' | '?') {
            let sentence = current.trim();
            if sentence.len() >= MIN_CLAIM_CHARS {
                claims.push(format!("{sentence}{ch}"));
            }
            current.clear();
        } else {
            current.push(ch);
        }
    }
    let tail = current.trim();
    if tail.len() >= MIN_CLAIM_CHARS {
        claims.push(tail.to_string());
    }
    claims
}

fn strip_source_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("[Source ") {
        out.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_verdicts(reply: &str) -> Result<Vec<VerdictRow>> {
    // models wrap JSON in fences or prose often enough to be defensive here
    let start = reply.find('[');
    let end = reply.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &reply[s..=e],
        _ => {
            return Err(Error::GenerationFailed(
                "verification reply contained no JSON array".to_string(),
            ))
        }
    };
    serde_json::from_str(json).map_err(|e| {
        Error::GenerationFailed(format!("unparseable verification reply: {e}"))
    })
}

/// Answer text for warned mode: the draft plus an explicit caution listing
/// each unsupported claim.
pub fn warned_text(draft: &str, claims: &[Claim]) -> String {
    let unsupported: Vec<&Claim> = claims.iter().filter(|c| !c.supported).collect();
    if unsupported.is_empty() {
        return format!(
            "{draft}\n\nCaution: parts of this answer could not be verified against the document."
        );
    }
    let mut text = format!(
        "{draft}\n\nCaution: the following claims could not be verified from the source material:\n"
    );
    for claim in unsupported {
        text.push_str(&format!("- {}\n", claim.text));
    }
    text
}

/// Safe refusal substituted for a low-confidence answer. The draft itself is
/// kept out of the payload; callers log it for observability.
pub fn fallback_text(query: &str, confidence: f32) -> String {
    let confidence_percent = (confidence * 100.0).round() as u32;
    format!(
        "I don't have enough reliable information to answer this question confidently.\n\n\
         Your question: \"{query}\"\n\n\
         Based on the document I have access to, I cannot provide an answer with \
         sufficient confidence (current confidence: {confidence_percent}%).\n\n\
         Please try rephrasing your question to focus on topics covered in the \
         document, or consult additional sources."
    )
}
