//! Stage 1 — Diagnose (§4.4). Grounded on `agents/diagnostic_agent.py`'s
//! `diagnose_full`/`diagnose_guided`/`_check_has_think_field`/
//! `_analyze_semantic_distribution`/`_analyze_reasoning_quality`.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::warn;

use crate::analysis::Clusterer;
use crate::knowledge::EmbeddingProvider;
use crate::models::{
    ClusterSummary, DiagnosticReport, Guidance, LowQualitySample, Mode, Record, MIN_ANSWER_LENGTH,
};
use crate::scheduler::generation_target;

const THINK_SCAN_LIMIT: usize = 10;

/// Run Stage 1 over the full dataset. Never fails: clustering/embedding
/// errors degrade to an empty cluster list rather than aborting the task
/// (§4.4 Stage 1 Failure clause).
pub async fn diagnose(
    records: &[Record],
    mode: Mode,
    guidance: Option<&Guidance>,
    embedder: &dyn EmbeddingProvider,
    clusterer: &dyn Clusterer,
) -> DiagnosticReport {
    let has_think_field = records
        .iter()
        .take(THINK_SCAN_LIMIT)
        .any(Record::has_think_key);

    let wants_semantic = mode == Mode::Auto
        || guidance.is_some_and(|g| g.wants(crate::models::FocusArea::SemanticDistribution));
    let wants_reasoning = mode == Mode::Auto
        || guidance.is_some_and(|g| g.wants(crate::models::FocusArea::ReasoningQuality));

    let sparse_clusters = if wants_semantic {
        analyze_semantic_distribution(records, embedder, clusterer).await
    } else {
        Vec::new()
    };

    let mut low_quality_samples = if wants_reasoning && has_think_field {
        analyze_reasoning_quality(records)
    } else {
        Vec::new()
    };

    if mode == Mode::Guided {
        if let Some(guidance) = guidance {
            for &idx in &guidance.problem_indices {
                if let Some(record) = records.get(idx) {
                    low_quality_samples.push(LowQualitySample {
                        index: idx,
                        record: record.clone().into_value(),
                        issue: "guided_selection".to_string(),
                    });
                }
            }
        }
    }

    DiagnosticReport {
        sparse_clusters,
        low_quality_samples,
        has_think_field,
    }
}

async fn analyze_semantic_distribution(
    records: &[Record],
    embedder: &dyn EmbeddingProvider,
    clusterer: &dyn Clusterer,
) -> Vec<ClusterSummary> {
    // Too few records for clustering to be meaningful; matches the Python
    // original's early return rather than treating it as a failure.
    if records.len() < 10 {
        return Vec::new();
    }

    let texts: Vec<String> = records
        .iter()
        .map(|r| r.question().unwrap_or_default().to_string())
        .collect();

    let embeddings = match embedder.embed_batch(&texts).await {
        Ok(embeddings) => embeddings,
        Err(err) => {
            warn!(%err, "embedding failed during diagnose, producing empty cluster list");
            return Vec::new();
        }
    };

    let assignments = clusterer.cluster(&embeddings);

    let mut by_label: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, assignment) in assignments.iter().enumerate() {
        if assignment.label == -1 {
            continue; // noise, per HDBSCAN convention
        }
        by_label.entry(assignment.label).or_default().push(idx);
    }

    by_label
        .into_iter()
        .map(|(label, indices)| {
            let size = indices.len();
            let sample_questions = indices
                .iter()
                .take(3)
                .filter_map(|&i| records[i].question().map(str::to_string))
                .collect();
            ClusterSummary {
                cluster_id: label.to_string(),
                size,
                characteristics: json!({ "cluster_id": label }),
                sample_questions,
                generation_target: generation_target(size),
            }
        })
        .filter(ClusterSummary::is_sparse)
        .collect()
}

fn analyze_reasoning_quality(records: &[Record]) -> Vec<LowQualitySample> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let lacks_reasoning = record.lacks_reasoning_content();
            let answer_too_short = record
                .answer()
                .map(|a| a.len() < MIN_ANSWER_LENGTH)
                .unwrap_or(true);

            if lacks_reasoning || answer_too_short {
                let issue = if lacks_reasoning { "missing_cot" } else { "short_answer" };
                Some(LowQualitySample {
                    index,
                    record: record.clone().into_value(),
                    issue: issue.to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DeterministicClusterer;
    use crate::knowledge::{DeterministicEmbedder, EmbeddingSource};
    use serde_json::json;

    fn embedder() -> EmbeddingSource {
        EmbeddingSource::Deterministic(DeterministicEmbedder::default())
    }

    #[tokio::test]
    async fn auto_mode_without_think_field_skips_reasoning_quality() {
        let records: Vec<Record> = (0..3)
            .map(|i| Record::from_value(json!({"question": format!("q{i}"), "answer": "a"})))
            .collect();
        let report = diagnose(&records, Mode::Auto, None, &embedder(), &DeterministicClusterer::default()).await;
        assert!(!report.has_think_field);
        assert!(report.low_quality_samples.is_empty());
    }

    #[tokio::test]
    async fn uppercase_think_key_is_detected() {
        let records = vec![Record::from_value(json!({"question": "q", "answer": "a", "THINK": "t"}))];
        let report = diagnose(&records, Mode::Auto, None, &embedder(), &DeterministicClusterer::default()).await;
        assert!(report.has_think_field);
    }

    #[tokio::test]
    async fn guided_problem_indices_are_appended_as_low_quality() {
        let records = vec![
            Record::from_value(json!({"question": "q1", "answer": "a1", "think": "t"})),
            Record::from_value(json!({"question": "q2", "answer": "a2", "think": "t"})),
        ];
        let guidance = Guidance {
            problem_indices: vec![1],
            ..Default::default()
        };
        let report = diagnose(
            &records,
            Mode::Guided,
            Some(&guidance),
            &embedder(),
            &DeterministicClusterer::default(),
        )
        .await;
        assert!(report.low_quality_samples.iter().any(|s| s.index == 1 && s.issue == "guided_selection"));
    }
}
