//! Stage 2 — Optimize + Generate (§4.4). Grounded on
//! `agents/optimization_agent.py`'s `optimize_samples`/`generate_samples`.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::warn;

use crate::llm::{generate_with_retry, ModelClient, ModelParams};
use crate::models::{ClusterSummary, DiagnosticReport, Guidance, Mode, Record};
use crate::scheduler::plan_batches;

/// Optimize sub-stage. Returns the full forward dataset: high-quality
/// records verbatim plus rewritten low-quality records (order: high-quality
/// first by original index, then rewritten records, matching the Python
/// original's partition-then-append order).
pub async fn optimize(
    dataset: &[Record],
    report: &DiagnosticReport,
    mode: Mode,
    guidance: Option<&Guidance>,
    client: &dyn ModelClient,
    batch_size: usize,
    retry_limit: u32,
) -> Vec<Record> {
    if !report.has_think_field {
        return dataset.to_vec();
    }

    let low_quality_indices: BTreeSet<usize> =
        report.low_quality_samples.iter().map(|s| s.index).collect();

    let mut out: Vec<Record> = dataset
        .iter()
        .enumerate()
        .filter(|(i, _)| !low_quality_indices.contains(i))
        .map(|(_, r)| r.clone())
        .collect();

    let low_quality: Vec<&Record> = low_quality_indices
        .iter()
        .filter_map(|&i| dataset.get(i))
        .collect();

    for (start, end) in plan_batches(low_quality.len(), batch_size) {
        for record in &low_quality[start..end] {
            let optimized = optimize_one(record, mode, guidance, client, retry_limit).await;
            out.push(optimized);
        }
    }

    out
}

pub(crate) async fn optimize_one(
    record: &Record,
    mode: Mode,
    guidance: Option<&Guidance>,
    client: &dyn ModelClient,
    retry_limit: u32,
) -> Record {
    let prompt = match mode {
        Mode::Auto => rewrite_prompt(record),
        Mode::Guided => guided_rewrite_prompt(record, guidance),
    };

    let params = ModelParams {
        max_tokens: 800,
        temperature: 0.7,
    };

    match generate_with_retry(client, &prompt, &params, retry_limit).await {
        Some(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => {
                let mut result = record.clone();
                if let Some(question) = parsed.get("question").and_then(Value::as_str) {
                    result.set("question", Value::String(question.to_string()));
                }
                if let Some(reasoning) = parsed.get("reasoning").and_then(Value::as_str) {
                    result.set("reasoning", Value::String(reasoning.to_string()));
                }
                if let Some(answer) = parsed.get("answer").and_then(Value::as_str) {
                    result.set("answer", Value::String(answer.to_string()));
                }
                result.set("_optimized", Value::Bool(true));
                result
            }
            Err(_) => {
                warn!("optimize: response was not valid JSON, keeping original record");
                record.clone()
            }
        },
        None => record.clone(),
    }
}

fn rewrite_prompt(record: &Record) -> String {
    let question = record.question().unwrap_or_default();
    let answer = record.answer().unwrap_or_default();
    format!(
        "Add a detailed chain-of-thought reasoning trace to this question/answer pair.\n\n\
         Question: {question}\nAnswer: {answer}\n\n\
         Respond with JSON only: {{\"question\": ..., \"reasoning\": ..., \"answer\": ...}}"
    )
}

fn guided_rewrite_prompt(record: &Record, guidance: Option<&Guidance>) -> String {
    let instructions = guidance
        .and_then(|g| g.optimization_instructions.as_deref())
        .unwrap_or_default();
    let question = record.question().unwrap_or_default();
    let answer = record.answer().unwrap_or_default();
    format!(
        "Improve this sample according to the following instructions: {instructions}\n\n\
         Question: {question}\nAnswer: {answer}\n\n\
         Respond with JSON only: {{\"question\": ..., \"reasoning\": ..., \"answer\": ...}}"
    )
}

/// Generate sub-stage. One external-model call per sparse cluster; accepts
/// up to `cluster.generation_target` records from a parsed JSON array,
/// discarding overflow. Parse failures contribute zero from that call.
pub async fn generate(
    report: &DiagnosticReport,
    mode: Mode,
    guidance: Option<&Guidance>,
    client: &dyn ModelClient,
    retry_limit: u32,
) -> Vec<Record> {
    let mut out = Vec::new();
    for cluster in &report.sparse_clusters {
        out.extend(generate_for_cluster(cluster, mode, guidance, client, retry_limit).await);
    }
    out
}

/// One sparse cluster's generation call (§4.3 Generation batching: one
/// external-model call per sparse cluster).
pub(crate) async fn generate_for_cluster(
    cluster: &ClusterSummary,
    mode: Mode,
    guidance: Option<&Guidance>,
    client: &dyn ModelClient,
    retry_limit: u32,
) -> Vec<Record> {
    let prompt = match mode {
        Mode::Auto => generate_prompt(cluster),
        Mode::Guided => guided_generate_prompt(cluster, guidance),
    };

    let params = ModelParams {
        max_tokens: 2000,
        temperature: 0.9,
    };

    let Some(text) = generate_with_retry(client, &prompt, &params, retry_limit).await else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<Value>>(&text) {
        Ok(samples) => samples
            .into_iter()
            .take(cluster.generation_target)
            .map(|value| {
                let mut record = Record::from_value(value);
                record.set("_generated", Value::Bool(true));
                record
            })
            .collect(),
        Err(_) => {
            warn!(cluster_id = %cluster.cluster_id, "generate: response was not a JSON array, contributing zero");
            Vec::new()
        }
    }
}

fn generate_prompt(cluster: &ClusterSummary) -> String {
    let seeds = cluster.sample_questions.join("\n- ");
    format!(
        "Based on these seed questions, generate {} similar but non-duplicate question/answer \
         pairs, each with a detailed reasoning trace.\n\nSeeds:\n- {seeds}\n\n\
         Respond with a JSON array only: [{{\"question\": ..., \"reasoning\": ..., \"answer\": ...}}, ...]",
        cluster.generation_target
    )
}

fn guided_generate_prompt(cluster: &ClusterSummary, guidance: Option<&Guidance>) -> String {
    let instructions = guidance
        .and_then(|g| g.generation_instructions.as_deref())
        .unwrap_or_default();
    let seeds = cluster.sample_questions.join("\n- ");
    format!(
        "Generate {} new samples following these instructions: {instructions}\n\n\
         Reference samples:\n- {seeds}\n\n\
         Respond with a JSON array only: [{{\"question\": ..., \"reasoning\": ..., \"answer\": ...}}, ...]",
        cluster.generation_target
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelError;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoJsonClient {
        response: String,
    }

    #[async_trait]
    impl ModelClient for EchoJsonClient {
        async fn generate(&self, _prompt: &str, _params: &ModelParams) -> Result<String, ModelError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn skips_optimization_when_no_think_field() {
        let dataset = vec![Record::from_value(json!({"question": "q", "answer": "a"}))];
        let report = DiagnosticReport::empty(false);
        let client = EchoJsonClient { response: "{}".into() };
        let result = optimize(&dataset, &report, Mode::Auto, None, &client, 10, 0).await;
        assert_eq!(result, dataset);
    }

    #[tokio::test]
    async fn optimizes_low_quality_record_and_marks_it() {
        let dataset = vec![
            Record::from_value(json!({"question": "q0", "answer": "a0", "think": "t"})),
            Record::from_value(json!({"question": "q1", "answer": "a1"})),
        ];
        let mut report = DiagnosticReport::empty(true);
        report.low_quality_samples.push(crate::models::LowQualitySample {
            index: 1,
            record: dataset[1].clone().into_value(),
            issue: "missing_cot".into(),
        });
        let client = EchoJsonClient {
            response: json!({"question": "q1", "reasoning": "R", "answer": "a1"}).to_string(),
        };
        let result = optimize(&dataset, &report, Mode::Auto, None, &client, 10, 0).await;
        assert_eq!(result.len(), 2);
        let optimized = result.iter().find(|r| r.get("_optimized").is_some()).unwrap();
        assert_eq!(optimized.get("reasoning").unwrap(), "R");
    }

    #[tokio::test]
    async fn generate_discards_overflow_beyond_target() {
        let mut report = DiagnosticReport::empty(true);
        report.sparse_clusters.push(ClusterSummary {
            cluster_id: "0".into(),
            size: 48,
            characteristics: json!({}),
            sample_questions: vec!["seed".into()],
            generation_target: 2,
        });
        let client = EchoJsonClient {
            response: json!([
                {"question": "a"}, {"question": "b"}, {"question": "c"}
            ])
            .to_string(),
        };
        let result = generate(&report, Mode::Auto, None, &client, 0).await;
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|r| r.get("_generated").is_some()));
    }

    #[tokio::test]
    async fn generate_parse_failure_contributes_zero() {
        let mut report = DiagnosticReport::empty(true);
        report.sparse_clusters.push(ClusterSummary {
            cluster_id: "0".into(),
            size: 5,
            characteristics: json!({}),
            sample_questions: vec![],
            generation_target: 10,
        });
        let client = EchoJsonClient { response: "not json".into() };
        let result = generate(&report, Mode::Auto, None, &client, 0).await;
        assert!(result.is_empty());
    }
}
