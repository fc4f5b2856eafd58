//! The `TaskStore` trait: SPEC_FULL.md component A.
//!
//! Shape grounded on the turul-mcp-task-storage crate's `TaskStorage` trait
//! (async, object-safe via `async_trait`, CRUD + paginated listing + a
//! dedicated status-update entry point) adapted to this crate's
//! merge-update and batch-result semantics (§4.1).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{BatchResult, Mode, Task, TaskRecord, TaskStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task already exists: {0}")]
    AlreadyExists(String),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A partial update applied atomically by `update_task`.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub completed_batches: Option<usize>,
    pub current_phase: Option<Option<crate::models::Phase>>,
    pub end_time: Option<Option<chrono::DateTime<chrono::Utc>>>,
    pub error: Option<Option<String>>,
    pub statistics: Option<Value>,
}

/// Durable key/value store holding task records, per-batch results, and a
/// time-ordered task index (§4.1).
///
/// Consistency requirements: writes are serializable per `task_id`; reads
/// may lag by at most one write with monotonic reads within a client
/// session. Implementations choose how to provide this (a single-writer
/// SQLite connection per call trivially satisfies it).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a fresh task record plus its persisted job inputs. Fails with
    /// `AlreadyExists` if `task_id` is already present.
    async fn create_task(
        &self,
        task_id: String,
        dataset: Value,
        knowledge: Option<Value>,
        guidance: Option<Value>,
        mode: Mode,
        batch_size: usize,
        save_reports: bool,
    ) -> Result<Task, StoreError>;

    /// Atomic partial merge over the listed fields.
    async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<Task, StoreError>;

    /// Store a batch result, increment `completed_batches`, recompute
    /// `progress` and `current_phase`. Atomic: a concurrent reader observes
    /// either the old or the new combination, never a partial increment.
    async fn put_batch_result(
        &self,
        task_id: &str,
        result: BatchResult,
        new_progress: f64,
        new_phase: crate::models::Phase,
    ) -> Result<Task, StoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Fetch the full task record, including the persisted job inputs
    /// needed to support `resume` (DESIGN.md Open Question 3).
    async fn get_task_record(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Ordered (by `batch_index`) list of batch results for a task.
    async fn get_batch_results(&self, task_id: &str) -> Result<Vec<BatchResult>, StoreError>;

    /// Most-recent-first by creation time, optionally filtered by status.
    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    /// Remove the task and all its batch results.
    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError>;

    /// `completed_batches` if the task exists and is not terminal, else `None`.
    async fn next_batch_to_process(&self, task_id: &str) -> Result<Option<usize>, StoreError>;

    /// Aggregate counts by status (`GET /stats`).
    async fn stats(&self) -> Result<Value, StoreError>;
}

/// Process-local `TaskStore`, backed by a `RwLock<HashMap>`. Useful for
/// `submit_sync`, the CLI's single-shot commands, and tests that don't need
/// a real database — the counterpart to `DieselTaskStore` for deployments
/// that don't run a worker fleet across processes.
pub struct InMemoryTaskStore {
    records: std::sync::RwLock<std::collections::HashMap<String, TaskRecord>>,
    batches: std::sync::RwLock<std::collections::HashMap<String, Vec<BatchResult>>>,
    order: std::sync::RwLock<Vec<String>>,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            records: std::sync::RwLock::new(std::collections::HashMap::new()),
            batches: std::sync::RwLock::new(std::collections::HashMap::new()),
            order: std::sync::RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(
        &self,
        task_id: String,
        dataset: Value,
        knowledge: Option<Value>,
        guidance: Option<Value>,
        mode: Mode,
        batch_size: usize,
        save_reports: bool,
    ) -> Result<Task, StoreError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&task_id) {
            return Err(StoreError::AlreadyExists(task_id));
        }
        let dataset_size = match &dataset {
            Value::Array(items) => items.len(),
            _ => 1,
        };
        let task = Task::new(task_id.clone(), dataset_size, mode, batch_size);
        records.insert(
            task_id.clone(),
            TaskRecord {
                task: task.clone(),
                dataset_blob: dataset,
                knowledge_blob: knowledge,
                guidance_blob: guidance,
                save_reports,
            },
        );
        drop(records);
        self.order.write().unwrap().push(task_id);
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if let Some(status) = update.status {
            record.task.status = status;
        }
        if let Some(progress) = update.progress {
            record.task.progress = progress;
        }
        if let Some(completed_batches) = update.completed_batches {
            record.task.completed_batches = completed_batches;
        }
        if let Some(current_phase) = update.current_phase {
            record.task.current_phase = current_phase;
        }
        if let Some(end_time) = update.end_time {
            record.task.end_time = end_time;
        }
        if let Some(error) = update.error {
            record.task.error = error;
        }
        if let Some(statistics) = update.statistics {
            record.task.statistics = statistics;
        }
        Ok(record.task.clone())
    }

    async fn put_batch_result(
        &self,
        task_id: &str,
        result: BatchResult,
        new_progress: f64,
        new_phase: crate::models::Phase,
    ) -> Result<Task, StoreError> {
        {
            let mut batches = self.batches.write().unwrap();
            batches.entry(task_id.to_string()).or_default().push(result);
        }
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        record.task.completed_batches += 1;
        record.task.progress = new_progress;
        record.task.current_phase = Some(new_phase);
        if record.task.status == TaskStatus::Pending {
            record.task.status = TaskStatus::Processing;
        }
        Ok(record.task.clone())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.records.read().unwrap().get(task_id).map(|r| r.task.clone()))
    }

    async fn get_task_record(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.read().unwrap().get(task_id).cloned())
    }

    async fn get_batch_results(&self, task_id: &str) -> Result<Vec<BatchResult>, StoreError> {
        Ok(self.batches.read().unwrap().get(task_id).cloned().unwrap_or_default())
    }

    async fn list_tasks(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<Task>, StoreError> {
        let records = self.records.read().unwrap();
        let order = self.order.read().unwrap();
        let tasks: Vec<Task> = order
            .iter()
            .rev()
            .filter_map(|id| records.get(id))
            .map(|r| r.task.clone())
            .filter(|t| status.map_or(true, |s| t.status == s))
            .take(limit)
            .collect();
        Ok(tasks)
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        let removed = self.records.write().unwrap().remove(task_id).is_some();
        if removed {
            self.batches.write().unwrap().remove(task_id);
            self.order.write().unwrap().retain(|id| id != task_id);
        }
        Ok(removed)
    }

    async fn next_batch_to_process(&self, task_id: &str) -> Result<Option<usize>, StoreError> {
        let records = self.records.read().unwrap();
        Ok(records.get(task_id).and_then(|r| {
            if r.task.status.is_terminal() {
                None
            } else {
                Some(r.task.completed_batches)
            }
        }))
    }

    async fn stats(&self) -> Result<Value, StoreError> {
        let records = self.records.read().unwrap();
        let mut counts = serde_json::Map::new();
        for status in [TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Completed, TaskStatus::Failed] {
            let count = records.values().filter(|r| r.task.status == status).count();
            counts.insert(status.to_string(), Value::from(count));
        }
        counts.insert("total".to_string(), Value::from(records.len()));
        Ok(Value::Object(counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_task_rejects_duplicate_ids() {
        let store = InMemoryTaskStore::new();
        store
            .create_task("t1".into(), Value::Array(vec![]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        let err = store
            .create_task("t1".into(), Value::Array(vec![]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn put_batch_result_advances_progress_and_is_retrievable() {
        let store = InMemoryTaskStore::new();
        store
            .create_task("t1".into(), Value::Array(vec![]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        let result = BatchResult::new("t1", 0, "diagnose");
        let task = store
            .put_batch_result("t1", result, 3.0, crate::models::Phase::Diagnostic)
            .await
            .unwrap();
        assert_eq!(task.progress, 3.0);
        assert_eq!(task.completed_batches, 1);
        assert_eq!(store.get_batch_results("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_tasks_filters_by_status_and_is_most_recent_first() {
        let store = InMemoryTaskStore::new();
        store
            .create_task("t1".into(), Value::Array(vec![]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        store
            .create_task("t2".into(), Value::Array(vec![]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        store
            .update_task("t1", TaskUpdate { status: Some(TaskStatus::Completed), end_time: Some(Some(chrono::Utc::now())), ..Default::default() })
            .await
            .unwrap();
        let completed = store.list_tasks(Some(TaskStatus::Completed), 10).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_id, "t1");
        let all = store.list_tasks(None, 10).await.unwrap();
        assert_eq!(all[0].task_id, "t2");
    }

    #[tokio::test]
    async fn delete_task_removes_its_batch_results() {
        let store = InMemoryTaskStore::new();
        store
            .create_task("t1".into(), Value::Array(vec![]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        store
            .put_batch_result("t1", BatchResult::new("t1", 0, "diagnose"), 3.0, crate::models::Phase::Diagnostic)
            .await
            .unwrap();
        assert_eq!(store.delete_task("t1").await.unwrap(), true);
        assert_eq!(store.get_batch_results("t1").await.unwrap().len(), 0);
        assert_eq!(status_count(&store).await, 0);
    }

    async fn status_count(store: &InMemoryTaskStore) -> usize {
        let store_stats = store.stats().await.unwrap();
        store_stats["total"].as_i64().unwrap() as usize
    }
}
