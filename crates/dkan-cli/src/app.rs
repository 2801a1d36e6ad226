//! Services shared by every command

use crate::config::Config;
use dkan_common::storage::SqliteStoreFactory;
use dkan_common::StoreFactory;
use dkan_datastore::{Database, DatastoreService};
use dkan_harvest::{HarvestService, StageRegistry};
use std::sync::Arc;
use tracing::debug;

pub struct App {
    pub config: Config,
    pub harvest: HarvestService,
    pub datastore: DatastoreService,
}

impl App {
    /// Connect to the configured database and build the services
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url).await?;
        let factory: Arc<dyn StoreFactory> = Arc::new(SqliteStoreFactory::new(db.pool().clone()));

        let registry = StageRegistry::with_defaults(config.datastore.http_timeout)?;
        debug!(stages = ?registry.stage_types(), "Harvest stages registered");
        let harvest = HarvestService::new(factory.clone(), Arc::new(registry)).await?;
        let datastore = DatastoreService::new(db, factory, config.datastore.clone()).await?;

        Ok(Self {
            config,
            harvest,
            datastore,
        })
    }
}
