//! Work that runs once a resource's import is done
//!
//! A [`PostImport`] chain hands the resource to each registered
//! [`PostImportProcessor`] in order, stops at the first failure and stores
//! the aggregate [`PostImportResult`].

use crate::database::Database;
use crate::dictionary::{AlterPlan, DictionaryDiscovery, DictionaryOutcome, DictionaryStore};
use crate::import::ImportService;
use crate::metastore::DistributionStore;
use crate::resource::DataResource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dkan_common::storage::JsonStoreExt;
use dkan_common::{DkanError, JobResult, JobStatus, JsonStore, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Store holding post-import results
pub const POST_IMPORT_STORE: &str = "datastore_post_import";

/// One step run against an imported resource
#[async_trait]
pub trait PostImportProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a short description of what was done
    async fn process(&self, resource: &DataResource) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostImportResult {
    pub resource_id: String,
    pub version: String,
    pub result: JobResult,
    /// Result of each processor that ran, in order
    #[serde(default)]
    pub processors: IndexMap<String, JobResult>,
    pub recorded_at: DateTime<Utc>,
}

/// Applies the resource's data dictionary to its table
pub struct DictionaryEnforcer {
    discovery: DictionaryDiscovery,
    dictionaries: DictionaryStore,
    imports: ImportService,
}

impl DictionaryEnforcer {
    pub fn new(discovery: DictionaryDiscovery, dictionaries: DictionaryStore, imports: ImportService) -> Self {
        Self {
            discovery,
            dictionaries,
            imports,
        }
    }
}

#[async_trait]
impl PostImportProcessor for DictionaryEnforcer {
    fn name(&self) -> &str {
        "dictionary_enforcer"
    }

    async fn process(&self, resource: &DataResource) -> Result<String> {
        let outcome = self
            .discovery
            .dictionary_id_for_resource(&resource.identifier, &resource.version)
            .await?;
        let dictionary_id = match outcome {
            DictionaryOutcome::Disabled => return Ok("Dictionary enforcement is disabled".into()),
            DictionaryOutcome::NoDictionary => return Ok("No data dictionary".into()),
            DictionaryOutcome::Dictionary(id) => id,
        };

        let dictionary = self
            .dictionaries
            .get(&dictionary_id)
            .await?
            .ok_or_else(|| DkanError::not_found(format!("data dictionary {dictionary_id}")))?;

        let table = self.imports.table(resource);
        if !table.exists().await? {
            return Err(DkanError::not_found(format!("datastore table {}", table.name())));
        }

        let plan = AlterPlan::build(table.name(), &table.schema().await?, &dictionary)?;
        let rows = plan.execute(&table).await?;
        Ok(format!(
            "Applied dictionary {dictionary_id}: {} column changes, {} indexes, {rows} rows",
            plan.changes.len(),
            plan.indexes.len()
        ))
    }
}

/// Runs the wrapped processor with strict mode relaxed
///
/// The default connection is active again once `process` returns, whether
/// it succeeded, failed or panicked.
pub struct StrictModeOffProcessor<P> {
    inner: P,
    db: Database,
}

impl<P: PostImportProcessor> StrictModeOffProcessor<P> {
    pub fn new(inner: P, db: Database) -> Self {
        Self { inner, db }
    }
}

#[async_trait]
impl<P: PostImportProcessor> PostImportProcessor for StrictModeOffProcessor<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn process(&self, resource: &DataResource) -> Result<String> {
        let _guard = self.db.relax_strict_mode()?;
        self.inner.process(resource).await
    }
}

/// Makes sure every distribution pointing at the resource is indexed
pub struct ReferenceIndexUpdater {
    distributions: DistributionStore,
}

impl ReferenceIndexUpdater {
    pub fn new(distributions: DistributionStore) -> Self {
        Self { distributions }
    }
}

#[async_trait]
impl PostImportProcessor for ReferenceIndexUpdater {
    fn name(&self) -> &str {
        "reference_index_updater"
    }

    async fn process(&self, resource: &DataResource) -> Result<String> {
        let count = self.distributions.reindex(&resource.file_path).await?;
        if count == 0 {
            warn!(resource_id = %resource.identifier, url = %resource.file_path, "No distribution references resource");
        }
        Ok(format!("{count} distributions reference {}", resource.file_path))
    }
}

#[derive(Clone)]
pub struct PostImport {
    processors: Vec<Arc<dyn PostImportProcessor>>,
    imports: ImportService,
    results: Arc<dyn JsonStore>,
}

impl PostImport {
    pub fn new(imports: ImportService, results: Arc<dyn JsonStore>) -> Self {
        Self {
            processors: Vec::new(),
            imports,
            results,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn PostImportProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn processor_names(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run the chain for one resource and store the outcome
    pub async fn run(&self, resource: &DataResource) -> Result<PostImportResult> {
        let import = self.imports.result(resource).await?;
        let mut processors = IndexMap::new();

        let result = if import.status != JobStatus::Done {
            JobResult::failed(format!(
                "Import of resource {} is not done (status: {})",
                resource.versioned_identifier(),
                import.status
            ))
        } else {
            let mut summary = Vec::new();
            let mut failure = None;
            for processor in &self.processors {
                match processor.process(resource).await {
                    Ok(data) => {
                        summary.push(format!("{}: {data}", processor.name()));
                        processors.insert(processor.name().to_string(), JobResult::done(data));
                    }
                    Err(e) => {
                        error!(
                            resource_id = %resource.identifier,
                            processor = processor.name(),
                            error = %e,
                            "Post-import processor failed"
                        );
                        processors.insert(processor.name().to_string(), JobResult::failed(e.to_string()));
                        failure = Some(format!("{}: {e}", processor.name()));
                        break;
                    }
                }
            }
            match failure {
                Some(e) => JobResult::failed(e),
                None => JobResult::done(summary.join("; ")),
            }
        };

        info!(
            resource_id = %resource.identifier,
            version = %resource.version,
            status = %result.status,
            processors = processors.len(),
            "Post-import finished"
        );

        let record = PostImportResult {
            resource_id: resource.identifier.clone(),
            version: resource.version.clone(),
            result,
            processors,
            recorded_at: Utc::now(),
        };
        self.results
            .store_as(&record, &resource.versioned_identifier())
            .await?;
        Ok(record)
    }

    pub async fn result(&self, resource: &DataResource) -> Result<Option<PostImportResult>> {
        self.results.retrieve_as(&resource.versioned_identifier()).await
    }

    /// Record that the chain is queued for `resource`
    ///
    /// Returns `false` if a result or pending marker already exists.
    pub async fn mark_pending(&self, resource: &DataResource) -> Result<bool> {
        if self.result(resource).await?.is_some() {
            return Ok(false);
        }
        let record = PostImportResult {
            resource_id: resource.identifier.clone(),
            version: resource.version.clone(),
            result: JobResult::new(),
            processors: IndexMap::new(),
            recorded_at: Utc::now(),
        };
        self.results
            .store_as(&record, &resource.versioned_identifier())
            .await?;
        Ok(true)
    }

    pub async fn forget(&self, resource: &DataResource) -> Result<bool> {
        self.results.remove(&resource.versioned_identifier()).await
    }
}
