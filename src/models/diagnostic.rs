//! `DiagnosticReport`: the single output of Stage 1 (diagnose).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Threshold below which a cluster is considered sparse (§4.4, GLOSSARY).
pub const SPARSE_CLUSTER_THRESHOLD: usize = 20;

/// Minimum answer length (characters) below which a record is flagged
/// low-quality, independent of reasoning-field presence (§4.4 Stage 1).
pub const MIN_ANSWER_LENGTH: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: String,
    pub size: usize,
    pub characteristics: Value,
    pub sample_questions: Vec<String>,
    /// `max(10, 50 - size)` unless the clusterer supplied an explicit target.
    pub generation_target: usize,
}

impl ClusterSummary {
    pub fn is_sparse(&self) -> bool {
        self.size < SPARSE_CLUSTER_THRESHOLD
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowQualitySample {
    pub index: usize,
    pub record: Value,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub sparse_clusters: Vec<ClusterSummary>,
    pub low_quality_samples: Vec<LowQualitySample>,
    pub has_think_field: bool,
}

impl DiagnosticReport {
    pub fn empty(has_think_field: bool) -> Self {
        Self {
            sparse_clusters: Vec::new(),
            low_quality_samples: Vec::new(),
            has_think_field,
        }
    }

    pub fn total_generation_target(&self) -> usize {
        self.sparse_clusters.iter().map(|c| c.generation_target).sum()
    }
}
