//! Pipeline State Machine (§4.4): five sequential, unconditionally-advancing
//! stages driven by the Batch Scheduler's progress weights. Each stage is
//! grounded on the matching Python agent (see module docs); `run` is the
//! driver, styled after
//! `other_examples/2320c0ed_Kaikei-e-Alt__recap-worker-recap-worker-src-pipeline-orchestrator.rs.rs`'s
//! stage-by-stage loop.

pub mod diagnose;
pub mod optimize;
pub mod redact;
pub mod verify;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::Clusterer;
use crate::knowledge::{EmbeddingProvider, KnowledgeCorpus};
use crate::llm::ModelClient;
use crate::models::{BatchResult, Guidance, Mode, Phase, Record, TaskStatus};
use crate::repository::{StoreError, TaskStore};
use crate::scheduler::{plan_batches, progress_for};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The task was cancelled (deleted, or externally marked failed) while
    /// the worker was mid-run (§5 Cancellation).
    #[error("task {0} cancelled mid-run")]
    Cancelled(String),
}

/// Tunable knobs a worker supplies to a pipeline run (§4.2 Configuration knobs).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub retry_limit: u32,
    pub self_correction_enabled: bool,
    pub save_reports: bool,
    /// Confidence floor for a record to pass verification outright (§4.4,
    /// `Settings::rag_confidence_threshold`).
    pub rag_confidence_threshold: f64,
    /// How many evidence documents to retrieve per record during verify
    /// (§4.4, `Settings::rag_retrieval_top_k`).
    pub rag_retrieval_top_k: usize,
}

/// Run the full five-stage pipeline for one task and persist progress as it
/// goes. Returns the final dataset in batch-preserved order (§4.4).
#[allow(clippy::too_many_arguments)]
pub async fn run<E: EmbeddingProvider>(
    store: &dyn TaskStore,
    task_id: &str,
    dataset: Vec<Record>,
    guidance: Option<Guidance>,
    corpus: &KnowledgeCorpus<E>,
    embedder: &dyn EmbeddingProvider,
    clusterer: &dyn Clusterer,
    client: &dyn ModelClient,
    config: &PipelineConfig,
) -> Result<Vec<Record>, PipelineError> {
    // Stage 0 — Mode select (§4.4).
    let mode = if guidance.is_some() { Mode::Guided } else { Mode::Auto };

    // Interruption and resumption (§4.3): consult `next_batch_to_process` up
    // front. If it returns `k > 0`, the first `k` batches were already
    // committed by an earlier, interrupted run of this task — skip redoing
    // their work by reading them back from the store instead. Diagnosis
    // itself is monolithic (not batched), so it is always recomputed — it is
    // pure and has no external-model call, so redoing it is cheap and safe.
    let resume_from = store.next_batch_to_process(task_id).await?.unwrap_or(0);
    let existing_batches = store.get_batch_results(task_id).await?;
    let existing_by_index: std::collections::HashMap<usize, &BatchResult> =
        existing_batches.iter().map(|b| (b.batch_index, b)).collect();
    if resume_from > 0 {
        info!(task_id, resume_from, "resuming: skipping already-committed batches");
    }

    let mut batch_counter = 0usize;
    check_not_cancelled(store, task_id).await?;

    // Stage 1 — Diagnose. Whole-dataset, unbatched (K = 1).
    let report = diagnose::diagnose(&dataset, mode, guidance.as_ref(), embedder, clusterer).await;
    let diagnose_index = batch_counter;
    batch_counter += 1;
    if diagnose_index >= resume_from {
        let mut diagnose_result = BatchResult::new(task_id, diagnose_index, "diagnose");
        if config.save_reports {
            diagnose_result.counters.insert(
                "report".to_string(),
                serde_json::to_value(&report).unwrap_or(serde_json::Value::Null),
            );
        }
        store
            .put_batch_result(task_id, diagnose_result, progress_for(Phase::Diagnostic, 1, 1), Phase::Diagnostic)
            .await?;
    }

    check_not_cancelled(store, task_id).await?;

    // Stage 2a — Optimize.
    let high_quality_count = dataset.len() - report.low_quality_samples.len();
    let mut forward: Vec<Record> = Vec::with_capacity(dataset.len());
    let low_quality_indices: std::collections::BTreeSet<usize> =
        report.low_quality_samples.iter().map(|s| s.index).collect();

    if !report.has_think_field {
        forward.extend(dataset.iter().cloned());
    } else {
        forward.extend(
            dataset
                .iter()
                .enumerate()
                .filter(|(i, _)| !low_quality_indices.contains(i))
                .map(|(_, r)| r.clone()),
        );

        let low_quality: Vec<&Record> = low_quality_indices
            .iter()
            .filter_map(|&i| dataset.get(i))
            .collect();

        let optimize_batches = plan_batches(low_quality.len(), config.batch_size);
        let total_optimize_batches = optimize_batches.len().max(1);
        for (n, (start, end)) in optimize_batches.iter().enumerate() {
            check_not_cancelled(store, task_id).await?;
            let current_index = batch_counter;
            batch_counter += 1;
            if current_index < resume_from {
                if let Some(existing) = existing_by_index.get(&current_index) {
                    forward.extend(existing.records.iter().cloned());
                }
                continue;
            }
            let mut batch_records = Vec::new();
            for record in &low_quality[*start..*end] {
                batch_records.push(
                    optimize::optimize_one(record, mode, guidance.as_ref(), client, config.retry_limit).await,
                );
            }
            forward.extend(batch_records.iter().cloned());
            let mut result = BatchResult::new(task_id, current_index, "optimize").with_records(batch_records);
            result.increment("high_quality_kept", high_quality_count as i64);
            store
                .put_batch_result(
                    task_id,
                    result,
                    progress_for(Phase::Optimization, n + 1, total_optimize_batches),
                    Phase::Optimization,
                )
                .await?;
        }
    }

    check_not_cancelled(store, task_id).await?;

    // Stage 2b — Generate. One external-model call per sparse cluster; the
    // progress denominator follows the ⌈T/b⌉ batching rule (§4.3), not the
    // cluster count, since a cluster's generation target can span several
    // model-call "batches" worth of records.
    let cluster_targets: Vec<usize> = report.sparse_clusters.iter().map(|c| c.generation_target).collect();
    let total_clusters = crate::scheduler::plan_generation_batches(&cluster_targets, config.batch_size).max(1);
    let mut generated = Vec::new();
    for (n, cluster) in report.sparse_clusters.iter().enumerate() {
        check_not_cancelled(store, task_id).await?;
        let current_index = batch_counter;
        batch_counter += 1;
        if current_index < resume_from {
            if let Some(existing) = existing_by_index.get(&current_index) {
                generated.extend(existing.records.iter().cloned());
            }
            continue;
        }
        let records =
            optimize::generate_for_cluster(cluster, mode, guidance.as_ref(), client, config.retry_limit).await;
        generated.extend(records.iter().cloned());
        let result = BatchResult::new(task_id, current_index, "generate").with_records(records);
        store
            .put_batch_result(
                task_id,
                result,
                progress_for(Phase::Generation, n + 1, total_clusters),
                Phase::Generation,
            )
            .await?;
    }
    forward.extend(generated);

    check_not_cancelled(store, task_id).await?;

    // Stage 3 — Verify.
    let verify_batches = plan_batches(forward.len(), config.batch_size);
    let total_verify_batches = verify_batches.len().max(1);
    let mut verified = Vec::with_capacity(forward.len());
    for (n, (start, end)) in verify_batches.iter().enumerate() {
        check_not_cancelled(store, task_id).await?;
        let current_index = batch_counter;
        batch_counter += 1;
        if current_index < resume_from {
            if let Some(existing) = existing_by_index.get(&current_index) {
                verified.extend(existing.records.iter().cloned());
            }
            continue;
        }
        let mut batch_records = Vec::new();
        let mut passed = 0i64;
        let mut corrected = 0i64;
        let mut rejected = 0i64;
        let mut parse_failures = 0i64;

        for record in &forward[*start..*end] {
            match verify::verify_one(
                record,
                corpus,
                client,
                config.retry_limit,
                config.self_correction_enabled,
                config.rag_confidence_threshold,
                config.rag_retrieval_top_k,
            )
            .await
            {
                verify::VerifyOutcome::Passed(r) => {
                    passed += 1;
                    batch_records.push(r);
                }
                verify::VerifyOutcome::Corrected(r) => {
                    corrected += 1;
                    batch_records.push(r);
                }
                verify::VerifyOutcome::Rejected => {
                    rejected += 1;
                }
                verify::VerifyOutcome::ParseFailure(r) => {
                    parse_failures += 1;
                    warn!(task_id, "verify: parse failure, record kept unverified and unchanged");
                    let _ = r; // not forwarded: neither passed nor corrected (DESIGN.md Open Question 4)
                }
            }
        }

        verified.extend(batch_records.iter().cloned());
        let mut result = BatchResult::new(task_id, current_index, "verify").with_records(batch_records);
        result.increment("passed", passed);
        result.increment("corrected", corrected);
        result.increment("rejected", rejected);
        result.increment("parse_failures", parse_failures);
        store
            .put_batch_result(
                task_id,
                result,
                progress_for(Phase::Verification, n + 1, total_verify_batches),
                Phase::Verification,
            )
            .await?;
    }

    check_not_cancelled(store, task_id).await?;

    // Stage 4 — Redact. Whole-result pass.
    let redact_index = batch_counter;
    let final_dataset = if redact_index < resume_from {
        existing_by_index.get(&redact_index).map(|b| b.records.clone()).unwrap_or_default()
    } else {
        let dataset = redact::redact_all(&verified);
        let cleaned_count = dataset.iter().filter(|r| r.get("_pii_cleaned").is_some()).count();
        let mut result = BatchResult::new(task_id, redact_index, "redact").with_records(dataset.clone());
        result.increment("cleaned_count", cleaned_count as i64);
        store
            .put_batch_result(task_id, result, progress_for(Phase::Cleaning, 1, 1), Phase::Cleaning)
            .await?;
        dataset
    };

    store
        .update_task(
            task_id,
            crate::repository::task_store::TaskUpdate {
                status: Some(TaskStatus::Completed),
                end_time: Some(Some(Utc::now())),
                ..Default::default()
            },
        )
        .await?;

    info!(task_id, records = final_dataset.len(), "pipeline completed");
    Ok(final_dataset)
}

async fn check_not_cancelled(store: &dyn TaskStore, task_id: &str) -> Result<(), PipelineError> {
    match store.get_task(task_id).await? {
        None => Err(PipelineError::Cancelled(task_id.to_string())),
        Some(task) if task.status == TaskStatus::Failed => Err(PipelineError::Cancelled(task_id.to_string())),
        Some(_) => Ok(()),
    }
}

