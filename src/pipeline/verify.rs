//! Stage 3 — Verify (§4.4). Grounded on `agents/verification_agent.py`'s
//! `verify_batch`/`_verify_single`; the per-record decision rule is
//! normative (DESIGN.md Open Question 1), not the claim-extraction variant.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::knowledge::KnowledgeCorpus;
use crate::knowledge::EmbeddingProvider;
use crate::llm::{generate_with_retry, ModelClient, ModelParams};
use crate::models::Record;

#[derive(Debug, Deserialize)]
struct Judgment {
    #[serde(default)]
    is_correct: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    corrected_answer: Option<String>,
    #[serde(default)]
    corrected_reasoning: Option<String>,
}

pub enum VerifyOutcome {
    Passed(Record),
    Corrected(Record),
    Rejected,
    /// The model response could not be parsed as JSON. Resolved (DESIGN.md
    /// Open Question 4) as distinct from `Passed`: the record is kept
    /// unchanged but counted separately, never silently marked passed.
    ParseFailure(Record),
}

/// Verify one record against the knowledge corpus.
///
/// `confidence_threshold` and `retrieval_top_k` mirror
/// `config.RAG_CONFIDENCE_THRESHOLD`/`config.RAG_RETRIEVAL_TOP_K` in the
/// Python original — threaded in from `Settings` via `PipelineConfig` rather
/// than fixed, so the env vars documented in §6 actually take effect.
#[allow(clippy::too_many_arguments)]
pub async fn verify_one<E: EmbeddingProvider>(
    record: &Record,
    corpus: &KnowledgeCorpus<E>,
    client: &dyn ModelClient,
    retry_limit: u32,
    self_correction_enabled: bool,
    confidence_threshold: f64,
    retrieval_top_k: usize,
) -> VerifyOutcome {
    let question = record.question().unwrap_or_default();
    let evidence = match corpus.search(question, retrieval_top_k).await {
        Ok(evidence) => evidence,
        Err(err) => {
            warn!(%err, "verify: corpus search failed, treating as empty corpus");
            Vec::new()
        }
    };

    if evidence.is_empty() {
        return VerifyOutcome::Passed(record.clone());
    }

    let reasoning = record.get("reasoning").and_then(Value::as_str).unwrap_or_default();
    let answer = record.answer().unwrap_or_default();
    let context = evidence
        .iter()
        .map(|(doc, _)| doc.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Given this knowledge base context, judge the accuracy of the following question/answer pair.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\nReasoning: {reasoning}\nAnswer: {answer}\n\n\
         Respond with JSON only: {{\"is_correct\": bool, \"confidence\": 0.0-1.0, \
         \"corrected_answer\": string?, \"corrected_reasoning\": string?}}"
    );

    let params = ModelParams {
        max_tokens: 1000,
        temperature: 0.3,
    };

    let Some(text) = generate_with_retry(client, &prompt, &params, retry_limit).await else {
        return VerifyOutcome::ParseFailure(record.clone());
    };

    match serde_json::from_str::<Judgment>(&text) {
        Ok(judgment) => {
            if judgment.is_correct && judgment.confidence >= confidence_threshold {
                VerifyOutcome::Passed(record.clone())
            } else if self_correction_enabled && judgment.corrected_answer.is_some() {
                let mut corrected = record.clone();
                if let Some(answer) = judgment.corrected_answer {
                    corrected.set("answer", Value::String(answer));
                }
                if let Some(reasoning) = judgment.corrected_reasoning {
                    corrected.set("reasoning", Value::String(reasoning));
                }
                corrected.set("_corrected", Value::Bool(true));
                VerifyOutcome::Corrected(corrected)
            } else {
                VerifyOutcome::Rejected
            }
        }
        Err(_) => VerifyOutcome::ParseFailure(record.clone()),
    }
}
