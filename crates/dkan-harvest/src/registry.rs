//! Stage registry
//!
//! Maps the `type` string of each plan stage to a factory. Resolving a plan
//! against the registry is how plans are validated before they run.

use crate::extract::{DataJsonExtract, Extract};
use crate::harvester::HarvestStores;
use crate::load::{DatasetLoad, Load};
use crate::plan::{HarvestPlan, StageSpec};
use crate::transform::{
    OverrideTransform, PrefixIdentifierTransform, RemoveFieldsTransform, Transform,
};
use dkan_common::{DkanError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type ExtractFactory = Arc<dyn Fn(&StageSpec) -> Result<Box<dyn Extract>> + Send + Sync>;
pub type TransformFactory =
    Arc<dyn Fn(&StageSpec, &HarvestPlan) -> Result<Box<dyn Transform>> + Send + Sync>;
pub type LoadFactory =
    Arc<dyn Fn(&StageSpec, &HarvestStores) -> Result<Box<dyn Load>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct StageRegistry {
    extracts: HashMap<String, ExtractFactory>,
    transforms: HashMap<String, TransformFactory>,
    loads: HashMap<String, LoadFactory>,
}

impl StageRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in stages
    ///
    /// Extract: `data_json`. Transforms: `override`, `remove_fields`,
    /// `prefix_identifier`. Load: `dataset`.
    pub fn with_defaults(http_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("dkan-harvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DkanError::network(format!("Failed to build HTTP client: {e}")))?;

        let mut registry = Self::new();
        registry.register_extract("data_json", move |spec| {
            Ok(Box::new(DataJsonExtract::from_spec(spec, client.clone())?) as Box<dyn Extract>)
        });
        registry.register_transform("override", |spec, plan| {
            Ok(Box::new(OverrideTransform::from_spec(spec, plan)?) as Box<dyn Transform>)
        });
        registry.register_transform("remove_fields", |spec, plan| {
            Ok(Box::new(RemoveFieldsTransform::from_spec(spec, plan)?) as Box<dyn Transform>)
        });
        registry.register_transform("prefix_identifier", |spec, plan| {
            Ok(Box::new(PrefixIdentifierTransform::from_spec(spec, plan)?) as Box<dyn Transform>)
        });
        registry.register_load("dataset", |spec, stores| {
            Ok(Box::new(DatasetLoad::from_spec(
                spec,
                stores.items.clone(),
                stores.hashes.clone(),
            )?) as Box<dyn Load>)
        });
        Ok(registry)
    }

    pub fn register_extract<F>(&mut self, stage_type: impl Into<String>, factory: F)
    where
        F: Fn(&StageSpec) -> Result<Box<dyn Extract>> + Send + Sync + 'static,
    {
        self.extracts.insert(stage_type.into(), Arc::new(factory));
    }

    pub fn register_transform<F>(&mut self, stage_type: impl Into<String>, factory: F)
    where
        F: Fn(&StageSpec, &HarvestPlan) -> Result<Box<dyn Transform>> + Send + Sync + 'static,
    {
        self.transforms.insert(stage_type.into(), Arc::new(factory));
    }

    pub fn register_load<F>(&mut self, stage_type: impl Into<String>, factory: F)
    where
        F: Fn(&StageSpec, &HarvestStores) -> Result<Box<dyn Load>> + Send + Sync + 'static,
    {
        self.loads.insert(stage_type.into(), Arc::new(factory));
    }

    pub fn build_extract(&self, spec: &StageSpec) -> Result<Box<dyn Extract>> {
        let factory = self
            .extracts
            .get(&spec.stage_type)
            .ok_or_else(|| unregistered("extract", spec))?;
        factory(spec)
    }

    pub fn build_transforms(&self, plan: &HarvestPlan) -> Result<Vec<Box<dyn Transform>>> {
        plan.transforms
            .iter()
            .map(|spec| {
                let factory = self
                    .transforms
                    .get(&spec.stage_type)
                    .ok_or_else(|| unregistered("transform", spec))?;
                factory(spec, plan)
            })
            .collect()
    }

    pub fn build_load(&self, spec: &StageSpec, stores: &HarvestStores) -> Result<Box<dyn Load>> {
        let factory = self
            .loads
            .get(&spec.stage_type)
            .ok_or_else(|| unregistered("load", spec))?;
        factory(spec, stores)
    }

    /// Registered type names per stage, sorted
    pub fn stage_types(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        fn sorted<V>(map: &HashMap<String, V>) -> Vec<String> {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            keys
        }
        (sorted(&self.extracts), sorted(&self.transforms), sorted(&self.loads))
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (extracts, transforms, loads) = self.stage_types();
        f.debug_struct("StageRegistry")
            .field("extracts", &extracts)
            .field("transforms", &transforms)
            .field("loads", &loads)
            .finish()
    }
}

fn unregistered(stage: &str, spec: &StageSpec) -> DkanError {
    DkanError::invalid_plan(format!(
        "{stage} type '{}' is not registered: {}",
        spec.stage_type,
        spec.to_json()
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let registry = StageRegistry::with_defaults(Duration::from_secs(5)).unwrap();
        let (extracts, transforms, loads) = registry.stage_types();
        assert_eq!(extracts, vec!["data_json"]);
        assert_eq!(transforms, vec!["override", "prefix_identifier", "remove_fields"]);
        assert_eq!(loads, vec!["dataset"]);
    }

    #[test]
    fn test_unknown_extract_names_stage_and_spec() {
        let registry = StageRegistry::with_defaults(Duration::from_secs(5)).unwrap();
        let spec = StageSpec::new("ckan").with_uri("http://x");
        let err = registry.build_extract(&spec).err().unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid harvest plan: extract type 'ckan'"), "{msg}");
        assert!(msg.contains("\"uri\":\"http://x\""), "{msg}");
    }
}
