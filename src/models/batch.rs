//! `BatchResult`: per-batch output, keyed by `(task_id, batch_index)`.

use serde::{Deserialize, Serialize};

use super::record::Record;

/// The output of running one stage's batch against a slice of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub task_id: String,
    pub batch_index: usize,
    pub stage: String,
    pub records: Vec<Record>,
    /// Free-form per-batch counters (e.g. `optimized_count`, `parse_failures`).
    pub counters: serde_json::Map<String, serde_json::Value>,
}

impl BatchResult {
    pub fn new(task_id: impl Into<String>, batch_index: usize, stage: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            batch_index,
            stage: stage.into(),
            records: Vec::new(),
            counters: serde_json::Map::new(),
        }
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn increment(&mut self, key: &str, by: i64) {
        let entry = self
            .counters
            .entry(key.to_string())
            .or_insert(serde_json::Value::from(0));
        if let Some(n) = entry.as_i64() {
            *entry = serde_json::Value::from(n + by);
        }
    }
}
