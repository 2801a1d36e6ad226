//! Configuration management

use anyhow::Context;
use dkan_datastore::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_FILES_DIR, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_IMPORT_TIME_LIMIT_SECS,
};
use dkan_datastore::{DatastoreConfig, DictionaryConfig, DictionaryMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database holding stores and datastore tables.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://dkan.db";

/// Default time budget of `dkan queue run` in seconds.
pub const DEFAULT_QUEUE_TIME_LIMIT_SECS: u64 = 60;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub datastore: DatastoreConfig,
    pub queue_time_limit: Duration,
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Configuration from the environment and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let dictionary_mode = match std::env::var("DKAN_DICTIONARY_MODE") {
            Ok(mode) => mode.parse::<DictionaryMode>()?,
            Err(_) => DictionaryMode::default(),
        };

        let config = Config {
            database_url: std::env::var("DKAN_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            datastore: DatastoreConfig {
                files_dir: std::env::var("DKAN_FILES_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_FILES_DIR)),
                http_timeout: Duration::from_secs(env_or("DKAN_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT_SECS)?),
                import_time_limit: Duration::from_secs(env_or(
                    "DKAN_IMPORT_TIME_LIMIT",
                    DEFAULT_IMPORT_TIME_LIMIT_SECS,
                )?),
                batch_size: env_or("DKAN_IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                strict_mode_off: env_or("DKAN_STRICT_MODE_OFF", false)?,
                dictionary: DictionaryConfig {
                    mode: dictionary_mode,
                    sitewide_id: std::env::var("DKAN_SITEWIDE_DICTIONARY").ok(),
                },
            },
            queue_time_limit: Duration::from_secs(env_or(
                "DKAN_QUEUE_TIME_LIMIT",
                DEFAULT_QUEUE_TIME_LIMIT_SECS,
            )?),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.queue_time_limit.is_zero() {
            anyhow::bail!("Queue time limit must be greater than 0");
        }

        if self.datastore.dictionary.mode == DictionaryMode::Sitewide
            && self.datastore.dictionary.sitewide_id.is_none()
        {
            tracing::warn!("Sitewide dictionary mode without DKAN_SITEWIDE_DICTIONARY - post-import will fail");
        }

        self.datastore.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            datastore: DatastoreConfig::default(),
            queue_time_limit: Duration::from_secs(DEFAULT_QUEUE_TIME_LIMIT_SECS),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset
fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {name}: {value}")),
        Err(_) => Ok(default),
    }
}
