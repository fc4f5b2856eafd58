//! Diesel-backed `TaskStore`, reusing this crate's dual SQLite/Postgres pool
//! abstraction (`repository::pool`), the same "structured columns for
//! indexed fields, JSON blob for the open-ended rest" pattern the teacher
//! crate uses for document metadata (`diesel_document.rs`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use serde_json::Value;

use crate::models::{BatchResult, Mode, Phase, Task, TaskRecord, TaskStatus};
use crate::schema::{batch_results, tasks};
use crate::with_conn;

use super::pool::DbPool;
use super::task_store::{StoreError, TaskStore, TaskUpdate};

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = tasks)]
struct TaskRow {
    task_id: String,
    status: String,
    mode: String,
    dataset_size: i64,
    batch_size: i64,
    total_batches: i64,
    completed_batches: i64,
    progress: f64,
    current_phase: Option<String>,
    start_time: String,
    end_time: Option<String>,
    error: Option<String>,
    statistics: String,
    dataset_blob: String,
    knowledge_blob: Option<String>,
    guidance_blob: Option<String>,
    save_reports: bool,
    created_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = batch_results)]
struct BatchRow {
    task_id: String,
    batch_index: i64,
    stage: String,
    records: String,
    counters: String,
}

fn status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Processing => "processing",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<TaskStatus, StoreError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "processing" => Ok(TaskStatus::Processing),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        other => Err(StoreError::Transient(format!("unknown status {other}"))),
    }
}

fn mode_str(m: Mode) -> &'static str {
    match m {
        Mode::Auto => "auto",
        Mode::Guided => "guided",
    }
}

fn parse_mode(s: &str) -> Mode {
    if s == "guided" {
        Mode::Guided
    } else {
        Mode::Auto
    }
}

fn phase_str(p: Phase) -> &'static str {
    match p {
        Phase::Diagnostic => "diagnostic",
        Phase::Optimization => "optimization",
        Phase::Generation => "generation",
        Phase::Verification => "verification",
        Phase::Cleaning => "cleaning",
    }
}

fn parse_phase(s: &str) -> Option<Phase> {
    match s {
        "diagnostic" => Some(Phase::Diagnostic),
        "optimization" => Some(Phase::Optimization),
        "generation" => Some(Phase::Generation),
        "verification" => Some(Phase::Verification),
        "cleaning" => Some(Phase::Cleaning),
        _ => None,
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

impl TaskRow {
    fn from_task(task: &Task, dataset_blob: String, knowledge_blob: Option<String>, guidance_blob: Option<String>, save_reports: bool) -> Self {
        Self {
            task_id: task.task_id.clone(),
            status: status_str(task.status).to_string(),
            mode: mode_str(task.mode).to_string(),
            dataset_size: task.dataset_size as i64,
            batch_size: task.batch_size as i64,
            total_batches: task.total_batches as i64,
            completed_batches: task.completed_batches as i64,
            progress: task.progress,
            current_phase: task.current_phase.map(|p| phase_str(p).to_string()),
            start_time: task.start_time.to_rfc3339(),
            end_time: task.end_time.map(|t| t.to_rfc3339()),
            error: task.error.clone(),
            statistics: task.statistics.to_string(),
            dataset_blob,
            knowledge_blob,
            guidance_blob,
            save_reports,
            created_at: task.start_time.to_rfc3339(),
        }
    }

    fn to_task(&self) -> Result<Task, StoreError> {
        Ok(Task {
            task_id: self.task_id.clone(),
            status: parse_status(&self.status)?,
            mode: parse_mode(&self.mode),
            dataset_size: self.dataset_size as usize,
            batch_size: self.batch_size as usize,
            total_batches: self.total_batches as usize,
            completed_batches: self.completed_batches as usize,
            progress: self.progress,
            current_phase: self.current_phase.as_deref().and_then(parse_phase),
            start_time: parse_rfc3339(&self.start_time),
            end_time: self.end_time.as_deref().map(parse_rfc3339),
            error: self.error.clone(),
            statistics: serde_json::from_str(&self.statistics).unwrap_or(Value::Null),
        })
    }

    fn to_task_record(&self) -> Result<TaskRecord, StoreError> {
        Ok(TaskRecord {
            task: self.to_task()?,
            dataset_blob: serde_json::from_str(&self.dataset_blob)?,
            knowledge_blob: self
                .knowledge_blob
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            guidance_blob: self
                .guidance_blob
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            save_reports: self.save_reports,
        })
    }
}

impl BatchRow {
    fn from_result(result: &BatchResult) -> Result<Self, StoreError> {
        Ok(Self {
            task_id: result.task_id.clone(),
            batch_index: result.batch_index as i64,
            stage: result.stage.clone(),
            records: serde_json::to_string(&result.records)?,
            counters: serde_json::to_string(&result.counters)?,
        })
    }

    fn to_result(&self) -> Result<BatchResult, StoreError> {
        Ok(BatchResult {
            task_id: self.task_id.clone(),
            batch_index: self.batch_index as usize,
            stage: self.stage.clone(),
            records: serde_json::from_str(&self.records)?,
            counters: serde_json::from_str(&self.counters)?,
        })
    }
}

/// Diesel-backed `TaskStore`. One instance per process; cheap to clone (the
/// pool itself is `Clone`).
#[derive(Clone)]
pub struct DieselTaskStore {
    pool: DbPool,
}

impl DieselTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let pool = DbPool::from_url(url).map_err(|e| StoreError::Transient(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Create the `tasks`/`batch_results` tables if they don't exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        with_conn!(self.pool, conn => {
            conn.batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS tasks (
                    task_id TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    mode TEXT NOT NULL,
                    dataset_size INTEGER NOT NULL,
                    batch_size INTEGER NOT NULL,
                    total_batches INTEGER NOT NULL,
                    completed_batches INTEGER NOT NULL,
                    progress REAL NOT NULL,
                    current_phase TEXT,
                    start_time TEXT NOT NULL,
                    end_time TEXT,
                    error TEXT,
                    statistics TEXT NOT NULL DEFAULT 'null',
                    dataset_blob TEXT NOT NULL,
                    knowledge_blob TEXT,
                    guidance_blob TEXT,
                    save_reports INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS batch_results (
                    task_id TEXT NOT NULL,
                    batch_index INTEGER NOT NULL,
                    stage TEXT NOT NULL,
                    records TEXT NOT NULL,
                    counters TEXT NOT NULL,
                    PRIMARY KEY (task_id, batch_index)
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                "#,
            )
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))
        })
    }
}

#[async_trait]
impl TaskStore for DieselTaskStore {
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
        let dataset_size = dataset.as_array().map(|a| a.len()).unwrap_or(0);
        let task = Task::new(task_id.clone(), dataset_size, mode, batch_size);
        let row = TaskRow::from_task(
            &task,
            dataset.to_string(),
            knowledge.map(|v| v.to_string()),
            guidance.map(|v| v.to_string()),
            save_reports,
        );

        with_conn!(self.pool, conn => {
            let inserted = diesel::insert_into(tasks::table)
                .values(&row)
                .execute(&mut conn)
                .await;
            match inserted {
                Ok(_) => Ok(task),
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                )) => Err(StoreError::AlreadyExists(task_id)),
                Err(e) => Err(StoreError::Transient(e.to_string())),
            }
        })
    }

    async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<Task, StoreError> {
        with_conn!(self.pool, conn => {
            let row: TaskRow = tasks::table
                .find(task_id.to_string())
                .first(&mut conn)
                .await
                .map_err(|_| StoreError::NotFound(task_id.to_string()))?;
            let mut task = row.to_task()?;

            if let Some(status) = update.status {
                task.status = status;
            }
            if let Some(progress) = update.progress {
                task.progress = progress;
            }
            if let Some(completed_batches) = update.completed_batches {
                task.completed_batches = completed_batches;
            }
            if let Some(phase) = update.current_phase {
                task.current_phase = phase;
            }
            if let Some(end_time) = update.end_time {
                task.end_time = end_time;
            }
            if let Some(error) = update.error {
                task.error = error;
            }
            if let Some(statistics) = update.statistics {
                task.statistics = statistics;
            }

            let new_row = TaskRow::from_task(
                &task,
                row.dataset_blob,
                row.knowledge_blob,
                row.guidance_blob,
                row.save_reports,
            );
            diesel::update(tasks::table.find(task_id.to_string()))
                .set(&new_row)
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            Ok(task)
        })
    }

    async fn put_batch_result(
        &self,
        task_id: &str,
        result: BatchResult,
        new_progress: f64,
        new_phase: Phase,
    ) -> Result<Task, StoreError> {
        let batch_row = BatchRow::from_result(&result)?;

        with_conn!(self.pool, conn => {
            let row: TaskRow = tasks::table
                .find(task_id.to_string())
                .first(&mut conn)
                .await
                .map_err(|_| StoreError::NotFound(task_id.to_string()))?;
            let mut task = row.to_task()?;
            task.completed_batches += 1;
            task.progress = new_progress;
            task.current_phase = Some(new_phase);

            diesel::insert_into(batch_results::table)
                .values(&batch_row)
                .on_conflict((batch_results::task_id, batch_results::batch_index))
                .do_update()
                .set(&batch_row)
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;

            let new_row = TaskRow::from_task(
                &task,
                row.dataset_blob,
                row.knowledge_blob,
                row.guidance_blob,
                row.save_reports,
            );
            diesel::update(tasks::table.find(task_id.to_string()))
                .set(&new_row)
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            Ok(task)
        })
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        with_conn!(self.pool, conn => {
            let row: Option<TaskRow> = tasks::table
                .find(task_id.to_string())
                .first(&mut conn)
                .await
                .optional()
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            row.map(|r| r.to_task()).transpose()
        })
    }

    async fn get_task_record(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        with_conn!(self.pool, conn => {
            let row: Option<TaskRow> = tasks::table
                .find(task_id.to_string())
                .first(&mut conn)
                .await
                .optional()
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            row.map(|r| r.to_task_record()).transpose()
        })
    }

    async fn get_batch_results(&self, task_id: &str) -> Result<Vec<BatchResult>, StoreError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<BatchRow> = batch_results::table
                .filter(batch_results::task_id.eq(task_id.to_string()))
                .order(batch_results::batch_index.asc())
                .load(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            rows.iter().map(BatchRow::to_result).collect()
        })
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<TaskRow> = if let Some(status) = status {
                tasks::table
                    .filter(tasks::status.eq(status_str(status).to_string()))
                    .order(tasks::created_at.desc())
                    .limit(limit as i64)
                    .load(&mut conn)
                    .await
            } else {
                tasks::table
                    .order(tasks::created_at.desc())
                    .limit(limit as i64)
                    .load(&mut conn)
                    .await
            }
            .map_err(|e| StoreError::Transient(e.to_string()))?;
            rows.iter().map(TaskRow::to_task).collect()
        })
    }

    async fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        with_conn!(self.pool, conn => {
            diesel::delete(batch_results::table.filter(batch_results::task_id.eq(task_id.to_string())))
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            let deleted = diesel::delete(tasks::table.find(task_id.to_string()))
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            Ok(deleted > 0)
        })
    }

    async fn next_batch_to_process(&self, task_id: &str) -> Result<Option<usize>, StoreError> {
        let task = self.get_task(task_id).await?;
        Ok(task.and_then(|t| (!t.status.is_terminal()).then_some(t.completed_batches)))
    }

    async fn stats(&self) -> Result<Value, StoreError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<TaskRow> = tasks::table
                .load(&mut conn)
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            let mut counts = serde_json::Map::new();
            for status in ["pending", "processing", "completed", "failed"] {
                let n = rows.iter().filter(|r| r.status == status).count();
                counts.insert(status.to_string(), Value::from(n));
            }
            counts.insert("total".to_string(), Value::from(rows.len()));
            Ok(Value::Object(counts))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> DieselTaskStore {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        // Keep the tempdir alive for the duration of the store's use by leaking it;
        // tests are short-lived processes so this is acceptable.
        std::mem::forget(dir);
        let store = DieselTaskStore::new(DbPool::sqlite_from_path(&db_path));
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = test_store().await;
        let dataset = json!([{"question": "q", "answer": "a"}]);
        store
            .create_task(
                "t1".into(),
                dataset.clone(),
                None,
                None,
                Mode::Auto,
                50,
                false,
            )
            .await
            .unwrap();

        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.dataset_size, 1);
        assert_eq!(task.status, TaskStatus::Pending);

        let record = store.get_task_record("t1").await.unwrap().unwrap();
        assert_eq!(record.dataset_blob, dataset);
    }

    #[tokio::test]
    async fn create_duplicate_task_id_conflicts() {
        let store = test_store().await;
        store
            .create_task("dup".into(), json!([]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        let err = store
            .create_task("dup".into(), json!([]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn put_batch_result_increments_completed_batches_atomically() {
        let store = test_store().await;
        store
            .create_task("t2".into(), json!([1, 2]), None, None, Mode::Auto, 1, false)
            .await
            .unwrap();

        let result = BatchResult::new("t2", 0, "optimization");
        let task = store
            .put_batch_result("t2", result, 25.0, Phase::Optimization)
            .await
            .unwrap();
        assert_eq!(task.completed_batches, 1);
        assert_eq!(task.progress, 25.0);

        let results = store.get_batch_results("t2").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn get_unknown_task_returns_none() {
        let store = test_store().await;
        assert!(store.get_task("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_task_and_batches() {
        let store = test_store().await;
        store
            .create_task("t3".into(), json!([]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        store
            .put_batch_result(
                "t3",
                BatchResult::new("t3", 0, "diagnose"),
                3.0,
                Phase::Diagnostic,
            )
            .await
            .unwrap();
        assert!(store.delete_task("t3").await.unwrap());
        assert!(store.get_task("t3").await.unwrap().is_none());
        assert!(store.get_batch_results("t3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_tasks_filters_by_status() {
        let store = test_store().await;
        store
            .create_task("a".into(), json!([]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        store
            .create_task("b".into(), json!([]), None, None, Mode::Auto, 50, false)
            .await
            .unwrap();
        store
            .update_task(
                "b",
                TaskUpdate {
                    status: Some(TaskStatus::Processing),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let pending = store.list_tasks(Some(TaskStatus::Pending), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_id, "a");
    }
}
