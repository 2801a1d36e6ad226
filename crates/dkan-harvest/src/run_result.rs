//! Harvest run records

use crate::load::{ItemStatus, LoadDiff};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Success,
    Failure,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "SUCCESS",
            StageStatus::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of each stage; stages that never ran are `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatuses {
    pub extract: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<StageStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunErrors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
    /// Transform failures by item identifier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transform: BTreeMap<String, String>,
    /// Load failures by item identifier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub load: BTreeMap<String, String>,
    /// The load stage as a whole could not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_stage: Option<String>,
}

/// Everything recorded about one harvest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRunResult {
    pub run_id: String,
    pub plan_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: StageStatuses,
    /// Identifiers in extraction order
    #[serde(default)]
    pub extracted_ids: Vec<String>,
    /// Outcome per identifier, extracted items first then removals
    #[serde(default)]
    pub items: IndexMap<String, ItemStatus>,
    #[serde(default)]
    pub errors: RunErrors,
    #[serde(default)]
    pub diff: LoadDiff,
}

impl HarvestRunResult {
    /// A result for a run whose extract stage failed
    pub fn extract_failed(
        run_id: String,
        plan_id: String,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            run_id,
            plan_id,
            started_at,
            finished_at: Utc::now(),
            status: StageStatuses {
                extract: StageStatus::Failure,
                transform: None,
                load: None,
            },
            extracted_ids: Vec::new(),
            items: IndexMap::new(),
            errors: RunErrors {
                extract: Some(error),
                ..Default::default()
            },
            diff: LoadDiff::default(),
        }
    }

    pub fn interpreter(&self) -> ResultInterpreter<'_> {
        ResultInterpreter { result: self }
    }
}

/// Aggregate counts over a [`HarvestRunResult`]
#[derive(Debug, Clone, Copy)]
pub struct ResultInterpreter<'a> {
    result: &'a HarvestRunResult,
}

impl ResultInterpreter<'_> {
    fn count(&self, status: ItemStatus) -> usize {
        self.result.items.values().filter(|s| **s == status).count()
    }

    pub fn count_created(&self) -> usize {
        self.count(ItemStatus::Created)
    }

    pub fn count_updated(&self) -> usize {
        self.count(ItemStatus::Updated)
    }

    /// Load failures plus transform failures
    pub fn count_failed(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    /// Number of extracted items
    pub fn count_processed(&self) -> usize {
        self.result.extracted_ids.len()
    }

    pub fn count_removed(&self) -> usize {
        self.count(ItemStatus::Removed)
    }

    pub fn count_unchanged(&self) -> usize {
        self.count(ItemStatus::Unchanged)
    }
}
