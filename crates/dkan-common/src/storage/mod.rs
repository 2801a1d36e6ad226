//! Key/value JSON storage
//!
//! Harvest plans, harvest items, hashes, run records, import job state and
//! post-import results all live in named [`JsonStore`]s handed out by a
//! [`StoreFactory`]. Two backends exist: [`MemoryStore`] for tests and
//! one-shot runs, and [`SqliteStore`] for anything that must survive a
//! process restart.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, MemoryStoreFactory};
pub use sqlite::{SqliteStore, SqliteStoreFactory};

use crate::error::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Generic JSON document store keyed by string identifiers
#[async_trait]
pub trait JsonStore: Send + Sync {
    /// Name the store was created under
    fn name(&self) -> &str;

    async fn retrieve(&self, id: &str) -> Result<Option<Value>>;

    /// Every document, ordered by identifier
    async fn retrieve_all(&self) -> Result<BTreeMap<String, Value>>;

    /// Insert or replace the document stored under `id`
    async fn store(&self, data: Value, id: &str) -> Result<()>;

    /// Returns `true` if a document was removed
    async fn remove(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    /// Remove every document
    async fn clear(&self) -> Result<()> {
        for id in self.retrieve_all().await?.into_keys() {
            self.remove(&id).await?;
        }
        Ok(())
    }
}

/// Typed helpers on top of [`JsonStore`]
#[async_trait]
pub trait JsonStoreExt: JsonStore {
    async fn retrieve_as<T>(&self, id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.retrieve(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn store_as<T>(&self, value: &T, id: &str) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.store(serde_json::to_value(value)?, id).await
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.retrieve_all().await?.into_keys().collect())
    }
}

impl<S: JsonStore + ?Sized> JsonStoreExt for S {}

/// Hands out named stores, creating them on first use
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn get_instance(&self, name: &str) -> Result<Arc<dyn JsonStore>>;

    /// Drop a store and everything in it
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Turn an arbitrary store name into a safe table identifier
pub(crate) fn table_name(name: &str) -> String {
    let mut out: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "store_");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_sanitized() {
        assert_eq!(table_name("harvest_plan-1_items"), "harvest_plan_1_items");
        assert_eq!(table_name("Import Jobs"), "import_jobs");
        assert_eq!(table_name("9lives"), "store_9lives");
        assert_eq!(table_name(""), "store_");
    }
}
