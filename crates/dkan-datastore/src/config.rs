//! Datastore settings
//!
//! Plain structs with defaults; the CLI fills them from the environment.

use crate::dictionary::DictionaryMode;
use dkan_common::{DkanError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FILES_DIR: &str = "./files";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_IMPORT_TIME_LIMIT_SECS: u64 = 30;
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Where fetched resource files are kept
    pub files_dir: PathBuf,
    pub http_timeout: Duration,
    /// Time budget of one import invocation
    pub import_time_limit: Duration,
    /// Rows per insert batch; the time budget is checked between batches
    pub batch_size: usize,
    /// Relax strict mode for table creation and inserts
    pub strict_mode_off: bool,
    pub dictionary: DictionaryConfig,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::from(DEFAULT_FILES_DIR),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            import_time_limit: Duration::from_secs(DEFAULT_IMPORT_TIME_LIMIT_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            strict_mode_off: false,
            dictionary: DictionaryConfig::default(),
        }
    }
}

impl DatastoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DkanError::config("import batch size must be greater than 0"));
        }
        if self.http_timeout.is_zero() {
            return Err(DkanError::config("HTTP timeout must be greater than 0"));
        }
        self.dictionary.validate()
    }
}

/// How resources find their data dictionary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    pub mode: DictionaryMode,
    /// Dictionary applied to every resource in sitewide mode
    pub sitewide_id: Option<String>,
}

impl DictionaryConfig {
    /// Sitewide mode without an id is allowed here; discovery reports it
    /// per resource
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.sitewide_id {
            if id.trim().is_empty() {
                return Err(DkanError::config("sitewide dictionary id is blank"));
            }
        }
        Ok(())
    }
}
