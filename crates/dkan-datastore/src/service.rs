//! Datastore facade wiring resources, imports, dictionaries, post-import
//! processing and the queues together

use crate::config::DatastoreConfig;
use crate::database::Database;
use crate::dictionary::{DataDictionary, DictionaryDiscovery, DictionaryStore};
use crate::import::{ImportService, ImportSummary, IMPORT_JOBS_STORE};
use crate::metastore::{Distribution, DistributionStore, ReferenceIndex};
use crate::post_import::{
    DictionaryEnforcer, PostImport, PostImportProcessor, PostImportResult, ReferenceIndexUpdater,
    StrictModeOffProcessor, POST_IMPORT_STORE,
};
use crate::queue::{
    resource_item, ImportQueueWorker, PostImportQueueWorker, Queue, QueueRunner,
    RunnerStats, StoreQueue, IMPORT_QUEUE, POST_IMPORT_QUEUE,
};
use crate::resource::{DataResource, Perspective, ResourceMapper};
use dkan_common::{DkanError, JobResult, Result, StoreFactory};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const RESOURCE_MAPPER_STORE: &str = "datastore_resources";
pub const DICTIONARY_STORE: &str = "data_dictionaries";
pub const DISTRIBUTION_STORE: &str = "metastore_distributions";
pub const REFERENCE_INDEX_STORE: &str = "metastore_references";

/// Lease on a claimed queue item
const QUEUE_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    pub import: RunnerStats,
    pub post_import: RunnerStats,
}

#[derive(Clone)]
pub struct DatastoreService {
    config: DatastoreConfig,
    mapper: ResourceMapper,
    distributions: DistributionStore,
    dictionaries: DictionaryStore,
    imports: ImportService,
    post_import: PostImport,
    import_queue: Arc<dyn Queue>,
    post_import_queue: Arc<dyn Queue>,
}

impl DatastoreService {
    pub async fn new(db: Database, factory: Arc<dyn StoreFactory>, config: DatastoreConfig) -> Result<Self> {
        config.validate()?;

        let mapper = ResourceMapper::new(factory.get_instance(RESOURCE_MAPPER_STORE).await?);
        let index = ReferenceIndex::new(factory.get_instance(REFERENCE_INDEX_STORE).await?);
        let distributions =
            DistributionStore::new(factory.get_instance(DISTRIBUTION_STORE).await?, index);
        let dictionaries = DictionaryStore::new(factory.get_instance(DICTIONARY_STORE).await?);
        let imports = ImportService::new(db.clone(), factory.get_instance(IMPORT_JOBS_STORE).await?, &config)?;

        let enforcer = DictionaryEnforcer::new(
            DictionaryDiscovery::new(config.dictionary.clone(), mapper.clone(), distributions.clone()),
            dictionaries.clone(),
            imports.clone(),
        );
        let enforcer: Arc<dyn PostImportProcessor> = if config.strict_mode_off {
            Arc::new(StrictModeOffProcessor::new(enforcer, db))
        } else {
            Arc::new(enforcer)
        };
        let post_import = PostImport::new(imports.clone(), factory.get_instance(POST_IMPORT_STORE).await?)
            .with_processor(enforcer)
            .with_processor(Arc::new(ReferenceIndexUpdater::new(distributions.clone())));

        Ok(Self {
            config,
            mapper,
            distributions,
            dictionaries,
            imports,
            post_import,
            import_queue: Self::queue(factory.as_ref(), IMPORT_QUEUE).await?,
            post_import_queue: Self::queue(factory.as_ref(), POST_IMPORT_QUEUE).await?,
        })
    }

    async fn queue(factory: &dyn StoreFactory, name: &str) -> Result<Arc<dyn Queue>> {
        let store = factory.get_instance(&format!("queue_{name}")).await?;
        Ok(Arc::new(StoreQueue::new(name, store)))
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn imports(&self) -> &ImportService {
        &self.imports
    }

    pub fn post_import(&self) -> &PostImport {
        &self.post_import
    }

    pub fn mapper(&self) -> &ResourceMapper {
        &self.mapper
    }

    pub fn import_queue(&self) -> Arc<dyn Queue> {
        self.import_queue.clone()
    }

    pub fn post_import_queue(&self) -> Arc<dyn Queue> {
        self.post_import_queue.clone()
    }

    /// Register a source resource, guessing its mime type when not given
    ///
    /// The source is fetched once and the resource is versioned by its
    /// bytes, so changed content gets its own version, job and table.
    pub async fn register_resource(&self, uri: &str, mime_type: Option<&str>) -> Result<DataResource> {
        let mime_type = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| DataResource::guess_mime(uri));

        let fetcher = self.imports.fetcher();
        let staged = fetcher.stage(uri).await?;
        let resource = DataResource::new(uri, mime_type)
            .with_content_version(&staged)
            .await?;
        let local = fetcher.adopt(&staged, &resource).await?;

        self.mapper.register(&resource).await?;
        self.mapper.register(&local).await?;
        info!(
            resource_id = %resource.identifier,
            version = %resource.version,
            local = %local.file_path,
            "Registered resource"
        );
        Ok(resource)
    }

    /// A registered source resource; `version` may be omitted when only one
    /// version is registered
    pub async fn resource(&self, identifier: &str, version: Option<&str>) -> Result<DataResource> {
        if let Some(version) = version {
            return self
                .mapper
                .get(identifier, version, Perspective::Source)
                .await?
                .ok_or_else(|| DkanError::not_found(format!("resource {identifier}__{version}")));
        }

        let mut versions = self.mapper.versions(identifier, Perspective::Source).await?;
        match versions.len() {
            0 => Err(DkanError::not_found(format!("resource {identifier}"))),
            1 => Ok(versions.remove(0)),
            n => Err(DkanError::lookup(format!(
                "resource {identifier} has {n} versions, choose one"
            ))),
        }
    }

    /// Run one import invocation directly, outside the queue
    pub async fn import(&self, resource: &DataResource) -> Result<JobResult> {
        self.imports.import(resource).await
    }

    /// Queue the resource's import
    pub async fn enqueue_import(&self, resource: &DataResource) -> Result<String> {
        self.import_queue.push(resource_item(resource)).await
    }

    pub async fn result(&self, resource: &DataResource) -> Result<JobResult> {
        self.imports.result(resource).await
    }

    pub async fn summary(&self, resource: &DataResource) -> Result<ImportSummary> {
        self.imports.summary(resource).await
    }

    pub fn table_name(&self, resource: &DataResource) -> String {
        self.imports.table_name(resource)
    }

    pub async fn stop(&self, resource: &DataResource) -> Result<JobResult> {
        self.imports.stop(resource).await
    }

    /// Run the post-import chain directly, outside the queue
    pub async fn post_process(&self, resource: &DataResource) -> Result<PostImportResult> {
        self.post_import.run(resource).await
    }

    pub async fn post_import_result(&self, resource: &DataResource) -> Result<Option<PostImportResult>> {
        self.post_import.result(resource).await
    }

    /// Drop the table, the import job and the post-import result
    pub async fn drop(&self, resource: &DataResource) -> Result<()> {
        self.imports.drop(resource).await?;
        self.post_import.forget(resource).await?;
        Ok(())
    }

    /// Drain the import queue, then the post-import queue
    pub async fn run_queues(&self, time_limit: Duration) -> Result<QueueReport> {
        let started = std::time::Instant::now();

        let import_worker = Arc::new(ImportQueueWorker::new(
            self.imports.clone(),
            self.mapper.clone(),
            self.post_import.clone(),
            self.post_import_queue.clone(),
        ));
        let import = QueueRunner::new(self.import_queue.clone(), import_worker, QUEUE_LEASE)
            .run(time_limit)
            .await?;

        let post_worker = Arc::new(PostImportQueueWorker::new(self.post_import.clone(), self.mapper.clone()));
        let post_import = QueueRunner::new(self.post_import_queue.clone(), post_worker, QUEUE_LEASE)
            .run(time_limit.saturating_sub(started.elapsed()))
            .await?;

        info!(
            imports = import.processed,
            post_imports = post_import.processed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Queues drained"
        );
        Ok(QueueReport { import, post_import })
    }

    pub async fn save_dictionary(&self, dictionary: &DataDictionary) -> Result<()> {
        self.dictionaries.save(dictionary).await
    }

    pub async fn dictionary(&self, identifier: &str) -> Result<Option<DataDictionary>> {
        self.dictionaries.get(identifier).await
    }

    pub async fn dictionary_ids(&self) -> Result<Vec<String>> {
        self.dictionaries.ids().await
    }

    pub async fn save_distribution(&self, distribution: &Distribution) -> Result<()> {
        self.distributions.save(distribution).await
    }
}
