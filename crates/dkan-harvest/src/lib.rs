//! DKAN harvest pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A harvest plan names an extract stage, an ordered list of transforms and a
//! load stage. [`Harvester`] resolves those stages through a [`StageRegistry`],
//! runs them, and records a [`HarvestRunResult`] per run so the most recent
//! run can be reverted. [`HarvestService`] keeps plans and run history in
//! stores obtained from a [`dkan_common::StoreFactory`].
//!
//! # Example
//!
//! ```no_run
//! use dkan_common::storage::MemoryStoreFactory;
//! use dkan_harvest::{HarvestService, StageRegistry};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> dkan_common::Result<()> {
//! let registry = StageRegistry::with_defaults(Duration::from_secs(30))?;
//! let service = HarvestService::new(Arc::new(MemoryStoreFactory::new()), Arc::new(registry)).await?;
//!
//! service
//!     .register_harvest(json!({
//!         "identifier": "city",
//!         "extract": {"type": "data_json", "uri": "https://data.example.gov/data.json"},
//!         "transforms": [],
//!         "load": {"type": "dataset"}
//!     }))
//!     .await?;
//!
//! let result = service.run_harvest("city").await?;
//! println!("created {}", result.interpreter().count_created());
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod harvester;
pub mod load;
pub mod plan;
pub mod registry;
pub mod run_result;
pub mod service;
pub mod transform;

pub use extract::{DataJsonExtract, Extract};
pub use harvester::{HarvestStores, Harvester};
pub use load::{DatasetLoad, ItemStatus, Load, LoadDiff, LoadReport};
pub use plan::{HarvestPlan, StageSpec};
pub use registry::StageRegistry;
pub use run_result::{HarvestRunResult, ResultInterpreter, RunErrors, StageStatus, StageStatuses};
pub use service::HarvestService;
pub use transform::Transform;
