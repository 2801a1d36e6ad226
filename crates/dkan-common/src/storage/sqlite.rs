//! SQLite-backed JSON store
//!
//! Each named store is its own two-column table (`id`, `data`) in a shared
//! database.

use super::{table_name, JsonStore, StoreFactory};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A named store persisted in one SQLite table
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    name: String,
    table: String,
}

impl SqliteStore {
    /// Open the store, creating its table if needed
    pub async fn open(pool: SqlitePool, name: &str) -> Result<Self> {
        let table = table_name(name);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (id TEXT PRIMARY KEY NOT NULL, data TEXT NOT NULL)"
        ))
        .execute(&pool)
        .await?;

        debug!(store = %name, table = %table, "Opened JSON store");

        Ok(Self {
            pool,
            name: name.to_string(),
            table,
        })
    }
}

#[async_trait]
impl JsonStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Value>> {
        let row = sqlx::query(&format!("SELECT data FROM \"{}\" WHERE id = ?", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn retrieve_all(&self) -> Result<BTreeMap<String, Value>> {
        let rows = sqlx::query(&format!("SELECT id, data FROM \"{}\" ORDER BY id", self.table))
            .fetch_all(&self.pool)
            .await?;

        let mut all = BTreeMap::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            let data: String = row.try_get("data")?;
            all.insert(id, serde_json::from_str(&data)?);
        }
        Ok(all)
    }

    async fn store(&self, data: Value, id: &str) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO \"{}\" (id, data) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            self.table
        ))
        .bind(id)
        .bind(serde_json::to_string(&data)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM \"{}\" WHERE id = ?", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query(&format!("DELETE FROM \"{}\"", self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Factory opening one table per store name in a shared pool
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    pool: SqlitePool,
}

impl SqliteStoreFactory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreFactory for SqliteStoreFactory {
    async fn get_instance(&self, name: &str) -> Result<Arc<dyn JsonStore>> {
        Ok(Arc::new(SqliteStore::open(self.pool.clone(), name).await?))
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table_name(name)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
