//! In-memory JSON store

use super::{JsonStore, StoreFactory};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Process-local store backed by an ordered map
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    data: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl JsonStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.data.read().await.get(id).cloned())
    }

    async fn retrieve_all(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.data.read().await.clone())
    }

    async fn store(&self, data: Value, id: &str) -> Result<()> {
        self.data.write().await.insert(id.to_string(), data);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.data.write().await.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.data.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.data.write().await.clear();
        Ok(())
    }
}

/// Factory returning the same [`MemoryStore`] for repeated names
#[derive(Debug, Default)]
pub struct MemoryStoreFactory {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn get_instance(&self, name: &str) -> Result<Arc<dyn JsonStore>> {
        let mut stores = self.stores.lock().await;
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new(name)))
            .clone();
        Ok(store)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        self.stores.lock().await.remove(name);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::JsonStoreExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let store = MemoryStore::new("plans");
        store.store(json!({"a": 1}), "one").await.unwrap();
        store.store(json!({"a": 2}), "two").await.unwrap();

        assert_eq!(store.retrieve("one").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.retrieve("three").await.unwrap(), None);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.ids().await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_store_replaces() {
        let store = MemoryStore::new("items");
        store.store(json!("old"), "x").await.unwrap();
        store.store(json!("new"), "x").await.unwrap();
        assert_eq!(store.retrieve("x").await.unwrap(), Some(json!("new")));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let store = MemoryStore::new("items");
        store.store(json!(1), "x").await.unwrap();
        assert!(store.remove("x").await.unwrap());
        assert!(!store.remove("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_factory_shares_instances() {
        let factory = MemoryStoreFactory::new();
        let a = factory.get_instance("hashes").await.unwrap();
        a.store(json!("h"), "1").await.unwrap();

        let b = factory.get_instance("hashes").await.unwrap();
        assert_eq!(b.count().await.unwrap(), 1);

        factory.destroy("hashes").await.unwrap();
        let c = factory.get_instance("hashes").await.unwrap();
        assert_eq!(c.count().await.unwrap(), 0);
    }
}
