//! `Task`: the top-level unit of work tracked by the Task Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Monotone task status: `pending -> processing -> {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// `auto` when no guidance was supplied at submission, `guided` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Auto,
    Guided,
}

/// Advisory marker of which stage a processing task is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Diagnostic,
    Optimization,
    Generation,
    Verification,
    Cleaning,
}

/// The top-level unit of work, as exposed through the Control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub mode: Mode,
    pub dataset_size: usize,
    pub batch_size: usize,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub progress: f64,
    pub current_phase: Option<Phase>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub statistics: Value,
}

impl Task {
    pub fn new(task_id: String, dataset_size: usize, mode: Mode, batch_size: usize) -> Self {
        let total_batches = total_batches(dataset_size, batch_size);
        Self {
            task_id,
            status: TaskStatus::Pending,
            mode,
            dataset_size,
            batch_size,
            total_batches,
            completed_batches: 0,
            progress: 0.0,
            current_phase: None,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            statistics: Value::Null,
        }
    }

    /// Assert the invariants from SPEC_FULL.md §3/§8 hold. Used in tests and
    /// as a cheap runtime sanity check before persisting.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.progress) {
            return Err(format!("progress {} out of range", self.progress));
        }
        if (self.progress - 100.0).abs() < f64::EPSILON && self.status != TaskStatus::Completed {
            return Err("progress=100 but status != completed".into());
        }
        if self.status == TaskStatus::Completed && (self.progress - 100.0).abs() > f64::EPSILON {
            return Err("status=completed but progress != 100".into());
        }
        if self.completed_batches > self.total_batches {
            return Err("completed_batches exceeds total_batches".into());
        }
        let end_time_set = self.end_time.is_some();
        if self.status.is_terminal() != end_time_set {
            return Err("end_time must be set iff status is terminal".into());
        }
        Ok(())
    }
}

/// `ceil(dataset_size / batch_size)`, with an empty dataset requiring zero
/// batches regardless of `batch_size`.
pub fn total_batches(dataset_size: usize, batch_size: usize) -> usize {
    if dataset_size == 0 {
        return 0;
    }
    dataset_size.div_ceil(batch_size.max(1))
}

/// The storage-layer row for a task: the public `Task` plus the bytes the
/// store needs to support resumption (see DESIGN.md Open Question 3).
///
/// The Python original this crate is grounded on never persists the inbound
/// dataset, so `resume_task` has no way to reconstruct a job. This crate
/// closes that gap by storing the dataset (and any knowledge/guidance that
/// travelled with it) alongside the task row at `create_task` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: Task,
    pub dataset_blob: Value,
    pub knowledge_blob: Option<Value>,
    pub guidance_blob: Option<Value>,
    pub save_reports: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_batches_matches_boundary_cases() {
        assert_eq!(total_batches(0, 50), 0);
        assert_eq!(total_batches(1, 50), 1);
        assert_eq!(total_batches(49, 50), 1);
        assert_eq!(total_batches(50, 50), 1);
        assert_eq!(total_batches(51, 50), 2);
    }

    #[test]
    fn status_transitions_are_monotone() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn invariants_reject_terminal_state_without_end_time() {
        let mut t = Task::new("t1".into(), 0, Mode::Auto, 50);
        t.status = TaskStatus::Completed;
        t.progress = 100.0;
        assert!(t.check_invariants().is_err());
        t.end_time = Some(Utc::now());
        assert!(t.check_invariants().is_ok());
    }
}
