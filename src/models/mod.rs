//! Data model shared by the store, scheduler, pipeline and control API.

mod batch;
mod diagnostic;
mod guidance;
mod record;
mod task;

pub use batch::BatchResult;
pub use diagnostic::{ClusterSummary, DiagnosticReport, LowQualitySample};
pub use guidance::{FocusArea, Guidance};
pub use record::Record;
pub use task::{Mode, Phase, Task, TaskRecord, TaskStatus};
