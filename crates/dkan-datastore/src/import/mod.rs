//! Import service: one [`ImportJob`] per resource version

pub mod job;

pub use job::{ImportJob, ImportOptions, ImportState};

use crate::config::DatastoreConfig;
use crate::database::{Database, DatabaseTable};
use crate::fetch::FileFetcher;
use crate::resource::DataResource;
use dkan_common::checksum::md5_hex;
use dkan_common::{JobResult, JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Store holding import job state
pub const IMPORT_JOBS_STORE: &str = "datastore_import_jobs";

/// `datastore_<md5(identifier__version)>`
pub fn table_name(resource: &DataResource) -> String {
    format!("datastore_{}", md5_hex(&resource.versioned_identifier()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub table_name: String,
    pub columns: Vec<String>,
    pub row_count: u64,
    pub result: JobResult,
}

#[derive(Clone)]
pub struct ImportService {
    db: Database,
    jobs: Arc<dyn JsonStore>,
    fetcher: FileFetcher,
    options: ImportOptions,
}

impl ImportService {
    pub fn new(db: Database, jobs: Arc<dyn JsonStore>, config: &DatastoreConfig) -> Result<Self> {
        Ok(Self {
            db,
            jobs,
            fetcher: FileFetcher::new(config.files_dir.clone(), config.http_timeout)?,
            options: ImportOptions {
                time_limit: config.import_time_limit,
                batch_size: config.batch_size,
                strict_mode_off: config.strict_mode_off,
            },
        })
    }

    /// Same service with different per-invocation limits
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ImportOptions {
        self.options
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn fetcher(&self) -> &FileFetcher {
        &self.fetcher
    }

    pub fn job(&self, resource: &DataResource) -> ImportJob {
        ImportJob::new(
            resource.clone(),
            self.table(resource),
            self.jobs.clone(),
            self.fetcher.clone(),
            self.options,
        )
    }

    pub fn table(&self, resource: &DataResource) -> DatabaseTable {
        DatabaseTable::new(self.db.clone(), table_name(resource))
    }

    pub fn table_name(&self, resource: &DataResource) -> String {
        table_name(resource)
    }

    /// Run one invocation of the resource's import
    pub async fn import(&self, resource: &DataResource) -> Result<JobResult> {
        self.job(resource).run().await
    }

    pub async fn result(&self, resource: &DataResource) -> Result<JobResult> {
        self.job(resource).result().await
    }

    pub async fn stop(&self, resource: &DataResource) -> Result<JobResult> {
        self.job(resource).stop().await
    }

    pub async fn summary(&self, resource: &DataResource) -> Result<ImportSummary> {
        let job = self.job(resource);
        let state = job.state().await?;
        let table = job.table();
        let (columns, row_count) = if table.exists().await? {
            (table.schema().await?.column_names(), table.count().await?)
        } else {
            (state.columns, 0)
        };
        Ok(ImportSummary {
            table_name: table.name().to_string(),
            columns,
            row_count,
            result: state.result,
        })
    }

    /// Drop the table and the job state
    pub async fn drop(&self, resource: &DataResource) -> Result<()> {
        self.job(resource).drop_job().await?;
        info!(resource_id = %resource.identifier, version = %resource.version, "Dropped datastore");
        Ok(())
    }
}
