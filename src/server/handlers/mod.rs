//! Control API handlers (§4.5, §6). JSON in, JSON out — no HTML, unlike the
//! teacher's document-browsing handlers this module replaces.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::knowledge::{EmbeddingProvider, EmbeddingSource, KnowledgeCorpus};
use crate::models::{Guidance, Mode, Record, TaskStatus};
use crate::pipeline;
use crate::repository::TaskStore;
use crate::worker::Job;

use super::error::ApiError;
use super::AppState;

/// Maximum `dataset_size` accepted by `submit_sync` (§4.5).
const SYNC_DATASET_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub dataset: Value,
    #[serde(default)]
    pub knowledge_base: Option<Vec<String>>,
    #[serde(default)]
    pub optimization_guidance: Option<Guidance>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub save_reports: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub mode: Mode,
    pub message: String,
}

fn dataset_to_records(dataset: &Value) -> Vec<Record> {
    match dataset {
        Value::Array(items) => items.iter().cloned().map(Record::from_value).collect(),
        other => vec![Record::from_value(other.clone())],
    }
}

/// `POST /optimize`: create a task and enqueue a job; returns immediately (§4.5 `submit`).
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = if req.optimization_guidance.is_some() { Mode::Guided } else { Mode::Auto };
    let task_id = req.task_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let dataset_size = dataset_to_records(&req.dataset).len();

    let guidance_value = req
        .optimization_guidance
        .as_ref()
        .map(|g| serde_json::to_value(g).unwrap_or(Value::Null));
    let knowledge_value = req
        .knowledge_base
        .as_ref()
        .map(|texts| serde_json::to_value(texts).unwrap_or(Value::Null));

    let task = state
        .task_store
        .create_task(
            task_id.clone(),
            req.dataset.clone(),
            knowledge_value,
            guidance_value,
            mode,
            state.pipeline_config.batch_size,
            req.save_reports,
        )
        .await?;
    let _ = dataset_size;

    let job = Job {
        task_id: task_id.clone(),
        dataset: req.dataset,
        knowledge_corpus: req.knowledge_base,
        guidance: req.optimization_guidance,
        save_reports: req.save_reports,
    };
    state.job_queue.enqueue(job).await?;

    Ok(Json(SubmitResponse {
        task_id,
        status: task.status,
        mode: task.mode,
        message: "task enqueued".to_string(),
    }))
}

/// `GET /optimize/{task_id}`: Task fields plus `optimized_dataset` once completed (§4.5 `get`).
pub async fn get(State(state): State<AppState>, Path(task_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .task_store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(task_id.clone()))?;

    let mut body = serde_json::to_value(&task).map_err(|e| ApiError::Internal(e.to_string()))?;
    if task.status == TaskStatus::Completed {
        if let Some(dataset) = final_dataset(&state, &task_id).await? {
            body["optimized_dataset"] = dataset;
        }
    }
    Ok(Json(body))
}

/// `GET /tasks/{id}/dataset`: the records from the most recent `redact` batch, if any.
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .task_store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(task_id.clone()))?;
    let dataset = final_dataset(&state, &task_id).await?.unwrap_or(Value::Array(Vec::new()));
    Ok(Json(dataset))
}

async fn final_dataset(state: &AppState, task_id: &str) -> Result<Option<Value>, ApiError> {
    let results = state.task_store.get_batch_results(task_id).await?;
    let records = results
        .into_iter()
        .rev()
        .find(|r| r.stage == "redact")
        .map(|r| Value::Array(r.records.into_iter().map(Record::into_value).collect()));
    Ok(records)
}

/// `POST /optimize/sync`: runs the pipeline inline and returns the final dataset (§4.5 `submit_sync`).
pub async fn submit_sync(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let records = dataset_to_records(&req.dataset);
    if records.len() > SYNC_DATASET_LIMIT {
        return Err(ApiError::TooLarge);
    }
    let mode = if req.optimization_guidance.is_some() { Mode::Guided } else { Mode::Auto };
    let task_id = req.task_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let guidance_value = req
        .optimization_guidance
        .as_ref()
        .map(|g| serde_json::to_value(g).unwrap_or(Value::Null));
    state
        .task_store
        .create_task(
            task_id.clone(),
            req.dataset,
            None,
            guidance_value,
            mode,
            state.pipeline_config.batch_size,
            req.save_reports,
        )
        .await?;

    let corpus: KnowledgeCorpus<EmbeddingSource> = KnowledgeCorpus::new(EmbeddingSource::Deterministic(
        crate::knowledge::DeterministicEmbedder::default(),
    ));
    if let Some(texts) = req.knowledge_base {
        corpus.add(texts).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    }

    let input_size = records.len();
    let config = pipeline::PipelineConfig { save_reports: req.save_reports, ..state.pipeline_config.clone() };

    let final_records = pipeline::run(
        state.task_store.as_ref(),
        &task_id,
        records,
        req.optimization_guidance,
        &corpus,
        state.embedder.as_ref(),
        state.clusterer.as_ref(),
        state.model_client.as_ref(),
        &config,
    )
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    if config.save_reports {
        if let Ok(batches) = state.task_store.get_batch_results(&task_id).await {
            let output_dir = crate::storage::artifacts::default_output_dir();
            let _ = crate::storage::artifacts::save_task_artifacts(&output_dir, &task_id, input_size, mode, &batches);
        }
    }

    Ok(Json(json!({
        "task_id": task_id,
        "status": TaskStatus::Completed,
        "mode": mode,
        "optimized_dataset": final_records,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

/// `GET /tasks`: most-recent-first, optionally filtered by status (§4.5 `list`).
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state
        .task_store
        .list_tasks(params.status, params.limit.unwrap_or(50))
        .await?;
    Ok(Json(tasks))
}

/// `DELETE /tasks/{id}` (§4.5 `delete`).
pub async fn delete(State(state): State<AppState>, Path(task_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.task_store.delete_task(&task_id).await?;
    if deleted {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(ApiError::NotFound(task_id))
    }
}

/// `POST /tasks/{id}/resume`: re-enqueue an existing non-terminal task (§4.5 `resume`).
pub async fn resume(State(state): State<AppState>, Path(task_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .task_store
        .get_task_record(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(task_id.clone()))?;

    if record.task.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "task {task_id} is already {} and cannot be resumed",
            record.task.status
        )));
    }

    let guidance: Option<Guidance> = record
        .guidance_blob
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e: serde_json::Error| ApiError::Internal(e.to_string()))?;
    let knowledge_corpus: Option<Vec<String>> = record
        .knowledge_blob
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e: serde_json::Error| ApiError::Internal(e.to_string()))?;

    let job = Job {
        task_id: task_id.clone(),
        dataset: record.dataset_blob,
        knowledge_corpus,
        guidance,
        save_reports: record.save_reports,
    };
    state.job_queue.enqueue(job).await?;
    Ok(Json(json!({ "ok": true })))
}

/// `POST /knowledge-base/load`: advisory only in a distributed deployment
/// (§4.5 `load_knowledge`) — the authoritative path is the job message.
pub async fn load_knowledge(Json(texts): Json<Vec<String>>) -> impl IntoResponse {
    Json(json!({ "acknowledged": true, "count": texts.len() }))
}

/// `GET /health` (§4.5 `health`).
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let llm_available = state.model_client.is_available().await;
    Json(json!({
        "status": if llm_available { "healthy" } else { "degraded" },
        "llm_available": llm_available,
        "embedding_model": format!("deterministic-{}", state.embedder.dimensions()),
        "engine": "dataforge",
    }))
}

/// `GET /stats` (§4.5 `stats`).
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats: Value = state.task_store.stats().await?;
    Ok(Json(stats))
}
