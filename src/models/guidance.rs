//! `Guidance`: explicit configuration record replacing the source's dynamic
//! nested guidance map (§9).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusArea {
    SemanticDistribution,
    ReasoningQuality,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Guidance {
    #[serde(default)]
    pub focus_areas: Vec<FocusArea>,
    #[serde(default)]
    pub problem_indices: Vec<usize>,
    #[serde(default)]
    pub optimization_instructions: Option<String>,
    #[serde(default)]
    pub generation_instructions: Option<String>,
}

impl Guidance {
    pub fn wants(&self, area: FocusArea) -> bool {
        self.focus_areas.contains(&area)
    }
}
