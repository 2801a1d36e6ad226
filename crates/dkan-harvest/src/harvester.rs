//! Harvest orchestration
//!
//! [`Harvester::harvest`] never returns an error: every failure is captured
//! in the [`HarvestRunResult`], which is also written to the run store.

use crate::extract::Extract;
use crate::load::{ItemStatus, Load};
use crate::plan::HarvestPlan;
use crate::registry::StageRegistry;
use crate::run_result::{HarvestRunResult, RunErrors, StageStatus, StageStatuses};
use crate::transform::{apply_chain, Transform};
use chrono::{Duration as ChronoDuration, Utc};
use dkan_common::storage::JsonStoreExt;
use dkan_common::{DkanError, JsonStore, Result};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Timestamp layout of run identifiers; sorts chronologically as text
pub const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// The stores one plan operates on
#[derive(Clone)]
pub struct HarvestStores {
    pub items: Arc<dyn JsonStore>,
    pub hashes: Arc<dyn JsonStore>,
    pub runs: Arc<dyn JsonStore>,
}

pub struct Harvester {
    plan: HarvestPlan,
    extract: Box<dyn Extract>,
    transforms: Vec<Box<dyn Transform>>,
    load: Box<dyn Load>,
    runs: Arc<dyn JsonStore>,
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester").field("plan", &self.plan).finish_non_exhaustive()
    }
}

impl Harvester {
    /// Resolve every stage of `plan`; fails with `InvalidPlan` if any stage
    /// type is unknown or its options are malformed
    pub fn new(plan: HarvestPlan, registry: &StageRegistry, stores: HarvestStores) -> Result<Self> {
        let extract = registry.build_extract(&plan.extract)?;
        let transforms = registry.build_transforms(&plan)?;
        let load = registry.build_load(&plan.load, &stores)?;

        Ok(Self {
            plan,
            extract,
            transforms,
            load,
            runs: stores.runs,
        })
    }

    pub fn plan(&self) -> &HarvestPlan {
        &self.plan
    }

    /// Run extract, transforms and load, then persist the run record
    pub async fn harvest(&self) -> HarvestRunResult {
        let plan_id = self.plan.identifier.clone();
        let started_at = Utc::now();
        let run_id = match self.next_run_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!(plan_id = %plan_id, error = %e, "Could not check existing run ids");
                Utc::now().format(RUN_ID_FORMAT).to_string()
            }
        };

        info!(plan_id = %plan_id, run_id = %run_id, "Harvest started");

        let result = match self.extract.run().await {
            Ok(items) => self.transform_and_load(run_id, started_at, items).await,
            Err(e) => {
                error!(plan_id = %plan_id, error = %e, "Extract failed");
                HarvestRunResult::extract_failed(run_id, plan_id.clone(), started_at, e.to_string())
            }
        };

        if let Err(e) = self.runs.store_as(&result, &result.run_id).await {
            error!(plan_id = %plan_id, run_id = %result.run_id, error = %e, "Failed to persist harvest run");
        }

        let counts = result.interpreter();
        info!(
            plan_id = %plan_id,
            run_id = %result.run_id,
            processed = counts.count_processed(),
            created = counts.count_created(),
            updated = counts.count_updated(),
            unchanged = counts.count_unchanged(),
            removed = counts.count_removed(),
            failed = counts.count_failed(),
            "Harvest finished"
        );

        result
    }

    async fn transform_and_load(
        &self,
        run_id: String,
        started_at: chrono::DateTime<Utc>,
        extracted: IndexMap<String, serde_json::Value>,
    ) -> HarvestRunResult {
        let extracted_ids: Vec<String> = extracted.keys().cloned().collect();
        let mut errors = RunErrors::default();
        let mut items = IndexMap::new();
        let mut statuses = IndexMap::new();

        for (id, item) in extracted {
            match apply_chain(&self.transforms, item) {
                Ok(item) => {
                    items.insert(id, item);
                }
                Err(e) => {
                    warn!(identifier = %id, error = %e, "Transform failed");
                    errors.transform.insert(id.clone(), e.to_string());
                    statuses.insert(id, ItemStatus::Failed);
                }
            }
        }

        let transform_status = if errors.transform.is_empty() {
            StageStatus::Success
        } else {
            StageStatus::Failure
        };

        let (load_status, diff) = match self.load.run(&items, &extracted_ids).await {
            Ok(report) => {
                let status = if report.errors.is_empty() {
                    StageStatus::Success
                } else {
                    StageStatus::Failure
                };
                statuses.extend(report.statuses);
                errors.load = report.errors;
                (status, report.diff)
            }
            Err(e) => {
                error!(plan_id = %self.plan.identifier, error = %e, "Load failed");
                for id in items.keys() {
                    statuses.insert(id.clone(), ItemStatus::Failed);
                }
                errors.load_stage = Some(e.to_string());
                (StageStatus::Failure, Default::default())
            }
        };

        // Keep extraction order for extracted items, removals after them
        let mut ordered = IndexMap::with_capacity(statuses.len());
        for id in &extracted_ids {
            if let Some(status) = statuses.shift_remove(id) {
                ordered.insert(id.clone(), status);
            }
        }
        ordered.extend(statuses);

        HarvestRunResult {
            run_id,
            plan_id: self.plan.identifier.clone(),
            started_at,
            finished_at: Utc::now(),
            status: StageStatuses {
                extract: StageStatus::Success,
                transform: Some(transform_status),
                load: Some(load_status),
            },
            extracted_ids,
            items: ordered,
            errors,
            diff,
        }
    }

    /// Revert the most recent run and drop its record
    ///
    /// Returns the number of items touched.
    pub async fn revert(&self) -> Result<usize> {
        let run_ids = self.runs.ids().await?;
        let Some(last) = run_ids.last() else {
            return Err(DkanError::not_found(format!(
                "no harvest runs recorded for plan {}",
                self.plan.identifier
            )));
        };

        let run: HarvestRunResult = self
            .runs
            .retrieve_as(last)
            .await?
            .ok_or_else(|| DkanError::not_found(format!("harvest run {last}")))?;

        let touched = self.load.revert(&run.diff).await?;
        self.runs.remove(last).await?;

        info!(plan_id = %self.plan.identifier, run_id = %last, touched, "Reverted harvest run");
        Ok(touched)
    }

    /// Timestamp id, bumped past any id already in the run store
    async fn next_run_id(&self) -> Result<String> {
        let mut at = Utc::now();
        let last = self.runs.ids().await?.pop();
        loop {
            let id = at.format(RUN_ID_FORMAT).to_string();
            match last {
                Some(ref last) if id.as_str() <= last.as_str() => {
                    at += ChronoDuration::microseconds(1);
                }
                _ => return Ok(id),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dkan_common::storage::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Extract returning whatever the test put in it
    struct Canned(Arc<Mutex<Vec<Value>>>);

    #[async_trait]
    impl Extract for Canned {
        async fn get_items(&self) -> Result<Vec<Value>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn stores() -> HarvestStores {
        HarvestStores {
            items: Arc::new(MemoryStore::new("items")),
            hashes: Arc::new(MemoryStore::new("hashes")),
            runs: Arc::new(MemoryStore::new("runs")),
        }
    }

    fn harvester(source: Arc<Mutex<Vec<Value>>>, transforms: Value, stores: HarvestStores) -> Harvester {
        let mut registry = StageRegistry::with_defaults(Duration::from_secs(5)).unwrap();
        registry.register_extract("canned", move |_| Ok(Box::new(Canned(source.clone())) as Box<dyn Extract>));
        let plan = HarvestPlan::from_value(json!({
            "identifier": "test",
            "extract": {"type": "canned"},
            "transforms": transforms,
            "load": {"type": "dataset"}
        }))
        .unwrap();
        Harvester::new(plan, &registry, stores).unwrap()
    }

    #[tokio::test]
    async fn test_extract_failure_is_reported_not_raised() {
        let source = Arc::new(Mutex::new(vec![]));
        let stores = stores();
        let h = harvester(source, json!([]), stores.clone());

        let result = h.harvest().await;
        assert_eq!(result.status.extract, StageStatus::Failure);
        assert_eq!(result.errors.extract.as_deref(), Some("No Items were extracted."));
        assert_eq!(result.status.load, None);
        assert_eq!(stores.runs.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_marks_item_failed() {
        let source = Arc::new(Mutex::new(vec![
            json!({"identifier": "1", "title": "a"}),
            json!({"identifier": "2"}),
        ]));
        let stores = stores();
        // Overriding identifier with a number makes prefix_identifier fail
        let h = harvester(
            source,
            json!([
                {"type": "override", "values": {"identifier": 5}},
                {"type": "prefix_identifier", "prefix": "x-"}
            ]),
            stores.clone(),
        );

        let result = h.harvest().await;
        assert_eq!(result.status.transform, Some(StageStatus::Failure));
        assert_eq!(result.interpreter().count_failed(), 2);
        assert_eq!(result.interpreter().count_processed(), 2);
        assert!(result.errors.transform["1"].contains("prefix_identifier"));
        assert_eq!(stores.items.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_ids_increase_and_revert_pops_latest() {
        let source = Arc::new(Mutex::new(vec![json!({"identifier": "1", "v": 1})]));
        let stores = stores();
        let h = harvester(source.clone(), json!([]), stores.clone());

        let first = h.harvest().await;
        *source.lock().unwrap() = vec![json!({"identifier": "1", "v": 2})];
        let second = h.harvest().await;
        assert!(second.run_id > first.run_id);
        assert_eq!(second.interpreter().count_updated(), 1);

        assert_eq!(h.revert().await.unwrap(), 1);
        assert_eq!(stores.items.retrieve("1").await.unwrap(), Some(json!({"identifier": "1", "v": 1})));
        assert_eq!(h.revert().await.unwrap(), 1);
        assert_eq!(stores.items.count().await.unwrap(), 0);
        assert!(matches!(h.revert().await, Err(DkanError::NotFound(_))));
    }

    #[test]
    fn test_unknown_load_type_is_invalid_plan() {
        let registry = StageRegistry::with_defaults(Duration::from_secs(5)).unwrap();
        let plan = HarvestPlan::from_value(json!({
            "identifier": "bad",
            "extract": {"type": "data_json", "uri": "/tmp/x.json"},
            "load": {"type": "ckan_package"}
        }))
        .unwrap();
        let err = Harvester::new(plan, &registry, stores()).unwrap_err();
        assert!(err.to_string().contains("load type 'ckan_package'"));
    }
}
