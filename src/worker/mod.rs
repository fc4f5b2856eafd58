//! Worker Runtime (§4.2): a long-lived process that consumes job messages
//! and drives the Pipeline. `WorkerContext` bundles the heavy singletons a
//! worker loads once at startup, grounded on the teacher's
//! `server::AppState::new` (build `Arc`-wrapped long-lived clients once,
//! share across the process lifetime).

pub mod queue;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::analysis::{Clusterer, DeterministicClusterer};
use crate::knowledge::{EmbeddingProvider, EmbeddingSource, KnowledgeCorpus};
use crate::llm::ModelClient;
use crate::models::Guidance;
use crate::pipeline::{self, PipelineConfig};
use crate::repository::TaskStore;

pub use queue::{InProcessQueue, JobQueue, QueueError};

/// A job message as it travels over the queue (§4.2, §6): the dataset
/// travels in the message, the store holds only state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub task_id: String,
    pub dataset: serde_json::Value,
    #[serde(default)]
    pub knowledge_corpus: Option<Vec<String>>,
    #[serde(default)]
    pub guidance: Option<Guidance>,
    #[serde(default)]
    pub save_reports: bool,
}

/// Heavy singletons loaded once per worker process and held for its
/// lifetime: the embedding model, the external-model client, and a fresh
/// empty vector index (§4.2 Lifecycle).
pub struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub clusterer: Arc<dyn Clusterer>,
    pub model_client: Arc<dyn ModelClient>,
    pub config: PipelineConfig,
}

impl WorkerContext {
    pub fn new(
        store: Arc<dyn TaskStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        model_client: Arc<dyn ModelClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            clusterer: Arc::new(DeterministicClusterer::default()),
            model_client,
            config,
        }
    }
}

/// Process one job to completion. A worker processes one job at a time
/// (§4.2): this function does not spawn concurrent sub-tasks, and callers
/// drive horizontal concurrency by running N worker loops.
pub async fn process_job(ctx: &WorkerContext, job: Job) {
    let task_id = job.task_id.clone();
    info!(task_id = %task_id, "processing job");

    let dataset: Vec<crate::models::Record> = match job.dataset {
        serde_json::Value::Array(items) => items.into_iter().map(crate::models::Record::from_value).collect(),
        other => vec![crate::models::Record::from_value(other)],
    };

    let corpus: KnowledgeCorpus<EmbeddingSource> = KnowledgeCorpus::new(EmbeddingSource::Deterministic(
        crate::knowledge::DeterministicEmbedder::default(),
    ));
    if let Some(texts) = job.knowledge_corpus {
        if let Err(err) = corpus.add(texts).await {
            error!(task_id = %task_id, %err, "failed to seed knowledge corpus, continuing with an empty one");
        }
    }

    let input_size = dataset.len();
    let mode = if job.guidance.is_some() { crate::models::Mode::Guided } else { crate::models::Mode::Auto };
    let config = PipelineConfig { save_reports: job.save_reports, ..ctx.config.clone() };

    let result = pipeline::run(
        ctx.store.as_ref(),
        &task_id,
        dataset,
        job.guidance,
        &corpus,
        ctx.embedder.as_ref(),
        ctx.clusterer.as_ref(),
        ctx.model_client.as_ref(),
        &config,
    )
    .await;

    match result {
        Ok(records) => {
            info!(task_id = %task_id, count = records.len(), "job completed");
            if config.save_reports {
                if let Ok(batches) = ctx.store.get_batch_results(&task_id).await {
                    let output_dir = crate::storage::artifacts::default_output_dir();
                    if let Err(err) =
                        crate::storage::artifacts::save_task_artifacts(&output_dir, &task_id, input_size, mode, &batches)
                    {
                        error!(task_id = %task_id, %err, "failed to persist task artifacts");
                    }
                }
            }
        }
        Err(pipeline::PipelineError::Cancelled(_)) => {
            info!(task_id = %task_id, "job cancelled mid-run, stopping without marking completion");
        }
        Err(err) => {
            error!(task_id = %task_id, %err, "job failed");
            let _ = ctx
                .store
                .update_task(
                    &task_id,
                    crate::repository::task_store::TaskUpdate {
                        status: Some(crate::models::TaskStatus::Failed),
                        error: Some(Some(err.to_string())),
                        end_time: Some(Some(chrono::Utc::now())),
                        ..Default::default()
                    },
                )
                .await;
        }
    }
}

/// The main worker loop: consume jobs from `queue` until it closes,
/// processing one at a time (§4.2).
pub async fn run_worker_loop(ctx: Arc<WorkerContext>, queue: Arc<dyn JobQueue>) {
    loop {
        match queue.consume().await {
            Ok(Some(job)) => process_job(&ctx, job).await,
            Ok(None) => break,
            Err(err) => {
                error!(%err, "queue consume failed, retrying after backoff");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}
