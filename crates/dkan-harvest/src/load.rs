//! Load stage
//!
//! Loading reconciles the extracted items against the plan's item and hash
//! stores using canonical content hashes. Every write is captured in a
//! [`LoadDiff`] so the run can be reverted later.

use crate::plan::StageSpec;
use async_trait::async_trait;
use dkan_common::checksum::content_hash;
use dkan_common::{DkanError, JsonStore, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-item outcome of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Created,
    Updated,
    Unchanged,
    Failed,
    Removed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Created => "CREATED",
            ItemStatus::Updated => "UPDATED",
            ItemStatus::Unchanged => "UNCHANGED",
            ItemStatus::Failed => "FAILED",
            ItemStatus::Removed => "REMOVED",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes performed by one load, enough to undo it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadDiff {
    pub created: Vec<String>,
    /// Previous value of every updated item
    pub updated: BTreeMap<String, Value>,
    /// Previous value of every removed item
    pub removed: BTreeMap<String, Value>,
}

impl LoadDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of [`Load::run`]
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub statuses: IndexMap<String, ItemStatus>,
    pub errors: BTreeMap<String, String>,
    pub diff: LoadDiff,
}

impl LoadReport {
    fn fail(&mut self, id: &str, err: DkanError) {
        warn!(identifier = %id, error = %err, "Failed to load item");
        self.statuses.insert(id.to_string(), ItemStatus::Failed);
        self.errors.insert(id.to_string(), err.to_string());
    }
}

#[async_trait]
pub trait Load: Send + Sync {
    /// Load `items` and reconcile removals against `extracted_ids`
    ///
    /// `extracted_ids` covers every extracted item, including those that
    /// failed to transform and are therefore absent from `items`.
    async fn run(&self, items: &IndexMap<String, Value>, extracted_ids: &[String]) -> Result<LoadReport>;

    /// Undo a previous load; returns the number of items touched
    async fn revert(&self, diff: &LoadDiff) -> Result<usize>;
}

/// What to do with stored items that disappeared from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    #[default]
    Delete,
    Keep,
}

/// Loads items into the plan's item store
pub struct DatasetLoad {
    items: Arc<dyn JsonStore>,
    hashes: Arc<dyn JsonStore>,
    orphans: OrphanPolicy,
}

impl DatasetLoad {
    pub fn new(items: Arc<dyn JsonStore>, hashes: Arc<dyn JsonStore>) -> Self {
        Self {
            items,
            hashes,
            orphans: OrphanPolicy::Delete,
        }
    }

    pub fn with_orphans(mut self, orphans: OrphanPolicy) -> Self {
        self.orphans = orphans;
        self
    }

    pub fn from_spec(
        spec: &StageSpec,
        items: Arc<dyn JsonStore>,
        hashes: Arc<dyn JsonStore>,
    ) -> Result<Self> {
        let orphans = match spec.option_str("orphans") {
            None | Some("delete") => OrphanPolicy::Delete,
            Some("keep") => OrphanPolicy::Keep,
            Some(_) => {
                return Err(DkanError::invalid_plan(format!(
                    "load option 'orphans' must be \"delete\" or \"keep\": {}",
                    spec.to_json()
                )))
            }
        };
        Ok(Self::new(items, hashes).with_orphans(orphans))
    }

    async fn load_item(
        &self,
        id: &str,
        item: &Value,
        known_hash: Option<&str>,
        diff: &mut LoadDiff,
    ) -> Result<ItemStatus> {
        let hash = content_hash(item);

        let Some(previous) = self.items.retrieve(id).await? else {
            self.items.store(item.clone(), id).await?;
            self.hashes.store(Value::String(hash), id).await?;
            diff.created.push(id.to_string());
            return Ok(ItemStatus::Created);
        };

        let previous_hash = known_hash
            .map(str::to_string)
            .unwrap_or_else(|| content_hash(&previous));
        if previous_hash == hash {
            return Ok(ItemStatus::Unchanged);
        }

        self.items.store(item.clone(), id).await?;
        self.hashes.store(Value::String(hash), id).await?;
        diff.updated.insert(id.to_string(), previous);
        Ok(ItemStatus::Updated)
    }

    async fn remove_item(&self, id: &str, diff: &mut LoadDiff) -> Result<()> {
        if let Some(previous) = self.items.retrieve(id).await? {
            diff.removed.insert(id.to_string(), previous);
        }
        self.items.remove(id).await?;
        self.hashes.remove(id).await?;
        Ok(())
    }

    async fn restore(&self, id: &str, value: &Value) -> Result<()> {
        self.items.store(value.clone(), id).await?;
        self.hashes.store(Value::String(content_hash(value)), id).await
    }
}

#[async_trait]
impl Load for DatasetLoad {
    async fn run(&self, items: &IndexMap<String, Value>, extracted_ids: &[String]) -> Result<LoadReport> {
        let known = self.hashes.retrieve_all().await?;
        let mut report = LoadReport::default();

        for (id, item) in items {
            let known_hash = known.get(id).and_then(Value::as_str);
            match self.load_item(id, item, known_hash, &mut report.diff).await {
                Ok(status) => {
                    debug!(identifier = %id, status = %status, "Loaded item");
                    report.statuses.insert(id.clone(), status);
                }
                Err(e) => report.fail(id, e),
            }
        }

        if self.orphans == OrphanPolicy::Delete {
            let extracted: HashSet<&str> = extracted_ids.iter().map(String::as_str).collect();
            for id in known.keys().filter(|id| !extracted.contains(id.as_str())) {
                match self.remove_item(id, &mut report.diff).await {
                    Ok(()) => {
                        debug!(identifier = %id, "Removed item no longer in source");
                        report.statuses.insert(id.clone(), ItemStatus::Removed);
                    }
                    Err(e) => report.fail(id, e),
                }
            }
        }

        Ok(report)
    }

    async fn revert(&self, diff: &LoadDiff) -> Result<usize> {
        let mut touched = 0;

        for id in &diff.created {
            self.items.remove(id).await?;
            self.hashes.remove(id).await?;
            touched += 1;
        }
        for (id, previous) in diff.updated.iter().chain(diff.removed.iter()) {
            self.restore(id, previous).await?;
            touched += 1;
        }

        Ok(touched)
    }
}
