//! Harvest plan and run bookkeeping

use crate::harvester::{HarvestStores, Harvester};
use crate::plan::HarvestPlan;
use crate::registry::StageRegistry;
use crate::run_result::HarvestRunResult;
use dkan_common::storage::JsonStoreExt;
use dkan_common::{DkanError, JsonStore, Result, StoreFactory};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Store holding registered plans
pub const PLAN_STORE: &str = "harvest_plans";

pub struct HarvestService {
    factory: Arc<dyn StoreFactory>,
    registry: Arc<StageRegistry>,
    plans: Arc<dyn JsonStore>,
}

impl HarvestService {
    pub async fn new(factory: Arc<dyn StoreFactory>, registry: Arc<StageRegistry>) -> Result<Self> {
        let plans = factory.get_instance(PLAN_STORE).await?;
        Ok(Self {
            factory,
            registry,
            plans,
        })
    }

    async fn stores(&self, plan_id: &str) -> Result<HarvestStores> {
        Ok(HarvestStores {
            items: self.factory.get_instance(&format!("harvest_{plan_id}_items")).await?,
            hashes: self.factory.get_instance(&format!("harvest_{plan_id}_hashes")).await?,
            runs: self.factory.get_instance(&format!("harvest_{plan_id}_runs")).await?,
        })
    }

    async fn harvester(&self, plan: HarvestPlan) -> Result<Harvester> {
        let stores = self.stores(&plan.identifier).await?;
        Harvester::new(plan, &self.registry, stores)
    }

    async fn require_plan(&self, plan_id: &str) -> Result<HarvestPlan> {
        self.get_plan(plan_id)
            .await?
            .ok_or_else(|| DkanError::not_found(format!("harvest plan {plan_id}")))
    }

    /// Validate and store a plan, replacing any plan with the same identifier
    pub async fn register_harvest(&self, plan: Value) -> Result<String> {
        let plan = HarvestPlan::from_value(plan)?;
        // Resolving the stages is the validation
        self.harvester(plan.clone()).await?;

        self.plans.store(plan.to_value()?, &plan.identifier).await?;
        info!(plan_id = %plan.identifier, "Registered harvest plan");
        Ok(plan.identifier)
    }

    /// Revert every run of a plan, then forget the plan and its stores
    pub async fn deregister_harvest(&self, plan_id: &str) -> Result<()> {
        let plan = self.require_plan(plan_id).await?;
        let harvester = self.harvester(plan).await?;

        let mut reverted = 0;
        while !self.run_ids(plan_id).await?.is_empty() {
            match harvester.revert().await {
                Ok(_) => reverted += 1,
                Err(e) => {
                    warn!(plan_id = %plan_id, error = %e, "Revert during deregistration failed");
                    break;
                }
            }
        }

        for suffix in ["items", "hashes", "runs"] {
            self.factory.destroy(&format!("harvest_{plan_id}_{suffix}")).await?;
        }
        self.plans.remove(plan_id).await?;

        info!(plan_id = %plan_id, reverted, "Deregistered harvest plan");
        Ok(())
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<HarvestPlan>> {
        match self.plans.retrieve(plan_id).await? {
            Some(value) => Ok(Some(HarvestPlan::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn plan_ids(&self) -> Result<Vec<String>> {
        self.plans.ids().await
    }

    pub async fn run_harvest(&self, plan_id: &str) -> Result<HarvestRunResult> {
        let plan = self.require_plan(plan_id).await?;
        Ok(self.harvester(plan).await?.harvest().await)
    }

    /// Revert the latest run; returns the number of items touched
    pub async fn revert_harvest(&self, plan_id: &str) -> Result<usize> {
        let plan = self.require_plan(plan_id).await?;
        self.harvester(plan).await?.revert().await
    }

    /// Run identifiers, oldest first
    pub async fn run_ids(&self, plan_id: &str) -> Result<Vec<String>> {
        self.stores(plan_id).await?.runs.ids().await
    }

    pub async fn run_result(&self, plan_id: &str, run_id: &str) -> Result<Option<HarvestRunResult>> {
        self.stores(plan_id).await?.runs.retrieve_as(run_id).await
    }

    pub async fn last_run(&self, plan_id: &str) -> Result<Option<HarvestRunResult>> {
        match self.run_ids(plan_id).await?.pop() {
            Some(run_id) => self.run_result(plan_id, &run_id).await,
            None => Ok(None),
        }
    }

    /// Items currently loaded for a plan
    pub async fn harvested_items(&self, plan_id: &str) -> Result<BTreeMap<String, Value>> {
        self.stores(plan_id).await?.items.retrieve_all().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dkan_common::storage::MemoryStoreFactory;
    use serde_json::json;
    use std::time::Duration;

    async fn service() -> HarvestService {
        let registry = StageRegistry::with_defaults(Duration::from_secs(5)).unwrap();
        HarvestService::new(Arc::new(MemoryStoreFactory::new()), Arc::new(registry))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_transform() {
        let service = service().await;
        let err = service
            .register_harvest(json!({
                "identifier": "p",
                "extract": {"type": "data_json", "uri": "/tmp/none.json"},
                "transforms": [{"type": "geocode"}],
                "load": {"type": "dataset"}
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("transform type 'geocode'"));
        assert!(service.plan_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_plan_is_not_found() {
        let service = service().await;
        assert!(matches!(service.run_harvest("nope").await, Err(DkanError::NotFound(_))));
        assert!(service.last_run("nope").await.unwrap().is_none());
    }
}
