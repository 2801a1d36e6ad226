//! Database connections and dynamic tables
//!
//! One SQLite pool backs every table. On top of it the [`Database`] keeps a
//! set of named connection profiles: `default` runs with strict mode on,
//! `strict_mode_off` relaxes the row size check. Only one relaxed scope may
//! be open at a time, and dropping its [`StrictModeOff`] guard always makes
//! `default` active again.

pub mod header;
pub mod limits;
pub mod schema;
pub mod table;

pub use header::{HeaderSanitizer, RECORD_NUMBER};
pub use schema::{ColumnSpec, ColumnType, IndexKind, IndexSpec, TableSchema};
pub use table::DatabaseTable;

use dkan_common::{DkanError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub const DEFAULT_CONNECTION: &str = "default";
pub const STRICT_MODE_OFF_CONNECTION: &str = "strict_mode_off";

/// Session settings of a connection profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub strict_mode: bool,
}

#[derive(Debug)]
struct Inner {
    pool: SqlitePool,
    active: Mutex<String>,
}

/// Shared handle to the datastore database
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Connect to a SQLite URL, creating the file if needed
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to an in-memory database sees its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(url = %url, "Connected to datastore database");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                active: Mutex::new(DEFAULT_CONNECTION.to_string()),
            }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    fn active(&self) -> MutexGuard<'_, String> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Key of the active connection profile
    pub fn active_key(&self) -> String {
        self.active().clone()
    }

    /// Settings of the active connection profile
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            strict_mode: self.active().as_str() != STRICT_MODE_OFF_CONNECTION,
        }
    }

    /// Activate the relaxed profile until the returned guard is dropped
    ///
    /// Fails if a non-default profile is already active.
    pub fn relax_strict_mode(&self) -> Result<StrictModeOff> {
        let mut active = self.active();
        if active.as_str() != DEFAULT_CONNECTION {
            return Err(DkanError::config(format!(
                "connection '{}' is already active",
                active.as_str()
            )));
        }
        *active = STRICT_MODE_OFF_CONNECTION.to_string();
        debug!("Strict mode relaxed");
        Ok(StrictModeOff { db: self.clone() })
    }

    fn reset(&self) {
        *self.active() = DEFAULT_CONNECTION.to_string();
        debug!("Default connection restored");
    }
}

/// Scope with strict mode relaxed; restores `default` on drop
#[derive(Debug)]
#[must_use = "strict mode is restored as soon as the guard is dropped"]
pub struct StrictModeOff {
    db: Database,
}

impl Drop for StrictModeOff {
    fn drop(&mut self) {
        self.db.reset();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_guard_scopes_relaxed_connection() {
        let db = db().await;
        assert_eq!(db.active_key(), DEFAULT_CONNECTION);
        assert!(db.settings().strict_mode);
        {
            let _guard = db.relax_strict_mode().unwrap();
            assert_eq!(db.active_key(), STRICT_MODE_OFF_CONNECTION);
            assert!(!db.settings().strict_mode);
            assert!(db.relax_strict_mode().is_err());
        }
        assert_eq!(db.active_key(), DEFAULT_CONNECTION);
        assert!(db.relax_strict_mode().is_ok());
    }

    #[tokio::test]
    async fn test_guard_restores_on_error_path() {
        let db = db().await;

        async fn failing(db: &Database) -> Result<()> {
            let _guard = db.relax_strict_mode()?;
            Err(DkanError::schema("boom"))
        }

        assert!(failing(&db).await.is_err());
        assert_eq!(db.active_key(), DEFAULT_CONNECTION);
    }

    #[tokio::test]
    async fn test_guard_restores_on_panic() {
        let db = db().await;
        let clone = db.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = clone.relax_strict_mode().unwrap();
            panic!("alter blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(db.active_key(), DEFAULT_CONNECTION);
    }
}
