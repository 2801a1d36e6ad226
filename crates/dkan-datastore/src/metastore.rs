//! Distribution records and the download URL reference index
//!
//! Only the slice of the catalog metastore the datastore needs: which
//! distributions point at a download URL, and what they say about their
//! data dictionary.

use dkan_common::storage::JsonStoreExt;
use dkan_common::{JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Media type marking `describedBy` as a table schema
pub const TABLE_SCHEMA_MEDIA_TYPE: &str = "application/vnd.tableschema+json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionData {
    #[serde(rename = "downloadURL", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(rename = "describedBy", default, skip_serializing_if = "Option::is_none")]
    pub described_by: Option<String>,
    #[serde(rename = "describedByType", default, skip_serializing_if = "Option::is_none")]
    pub described_by_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub identifier: String,
    pub data: DistributionData,
}

impl Distribution {
    /// Dictionary identifier named by `describedBy`, if it is a table schema
    ///
    /// The identifier is the last non-empty path segment of the reference.
    pub fn dictionary_id(&self) -> Option<String> {
        if self.data.described_by_type.as_deref() != Some(TABLE_SCHEMA_MEDIA_TYPE) {
            return None;
        }
        let reference = self.data.described_by.as_deref()?;
        let path = reference.split(['?', '#']).next().unwrap_or_default();
        path.split('/')
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_string)
    }
}

/// Download URL → identifiers of distributions referencing it
#[derive(Clone)]
pub struct ReferenceIndex {
    store: Arc<dyn JsonStore>,
}

impl ReferenceIndex {
    pub fn new(store: Arc<dyn JsonStore>) -> Self {
        Self { store }
    }

    pub async fn referencing(&self, download_url: &str) -> Result<Vec<String>> {
        Ok(self.store.retrieve_as(download_url).await?.unwrap_or_default())
    }

    /// Record that `distribution_id` references `download_url`
    pub async fn add(&self, download_url: &str, distribution_id: &str) -> Result<()> {
        let mut ids = self.referencing(download_url).await?;
        if !ids.iter().any(|id| id == distribution_id) {
            ids.push(distribution_id.to_string());
            debug!(url = %download_url, distribution_id = %distribution_id, "Indexed reference");
            self.store.store_as(&ids, download_url).await?;
        }
        Ok(())
    }

    pub async fn remove(&self, download_url: &str, distribution_id: &str) -> Result<()> {
        let mut ids = self.referencing(download_url).await?;
        ids.retain(|id| id != distribution_id);
        if ids.is_empty() {
            self.store.remove(download_url).await?;
        } else {
            self.store.store_as(&ids, download_url).await?;
        }
        Ok(())
    }
}

/// Distribution records keyed by identifier, kept in step with the
/// [`ReferenceIndex`]
#[derive(Clone)]
pub struct DistributionStore {
    store: Arc<dyn JsonStore>,
    index: ReferenceIndex,
}

impl DistributionStore {
    pub fn new(store: Arc<dyn JsonStore>, index: ReferenceIndex) -> Self {
        Self { store, index }
    }

    pub async fn save(&self, distribution: &Distribution) -> Result<()> {
        if let Some(previous) = self.get(&distribution.identifier).await? {
            if let Some(url) = previous.data.download_url {
                self.index.remove(&url, &previous.identifier).await?;
            }
        }
        self.store
            .store_as(distribution, &distribution.identifier)
            .await?;
        if let Some(url) = &distribution.data.download_url {
            self.index.add(url, &distribution.identifier).await?;
        }
        Ok(())
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<Distribution>> {
        self.store.retrieve_as(identifier).await
    }

    pub async fn all(&self) -> Result<Vec<Distribution>> {
        self.store
            .retrieve_all()
            .await?
            .into_values()
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .collect()
    }

    /// Index every stored distribution whose download URL is `download_url`;
    /// returns how many reference it
    pub async fn reindex(&self, download_url: &str) -> Result<usize> {
        let mut count = 0;
        for distribution in self.all().await? {
            if distribution.data.download_url.as_deref() == Some(download_url) {
                self.index.add(download_url, &distribution.identifier).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dkan_common::storage::MemoryStore;
    use serde_json::json;

    fn distribution(id: &str, url: &str, described_by: Option<&str>, kind: Option<&str>) -> Distribution {
        Distribution {
            identifier: id.into(),
            data: DistributionData {
                download_url: Some(url.into()),
                media_type: Some("text/csv".into()),
                described_by: described_by.map(str::to_string),
                described_by_type: kind.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_dictionary_id_requires_table_schema_type() {
        let d = distribution(
            "d1",
            "u",
            Some("https://catalog.example.gov/api/1/metastore/schemas/data-dictionary/items/dict-7"),
            Some(TABLE_SCHEMA_MEDIA_TYPE),
        );
        assert_eq!(d.dictionary_id().as_deref(), Some("dict-7"));

        let d = distribution("d1", "u", Some("https://x/items/dict-7"), Some("application/pdf"));
        assert_eq!(d.dictionary_id(), None);

        let d = distribution("d1", "u", None, Some(TABLE_SCHEMA_MEDIA_TYPE));
        assert_eq!(d.dictionary_id(), None);
    }

    #[test]
    fn test_distribution_uses_dcat_field_names() {
        let d: Distribution = serde_json::from_value(json!({
            "identifier": "d1",
            "data": {"downloadURL": "https://x/a.csv", "describedByType": TABLE_SCHEMA_MEDIA_TYPE}
        }))
        .unwrap();
        assert_eq!(d.data.download_url.as_deref(), Some("https://x/a.csv"));
    }

    #[tokio::test]
    async fn test_store_keeps_index_current() {
        let index = ReferenceIndex::new(Arc::new(MemoryStore::new("refs")));
        let store = DistributionStore::new(Arc::new(MemoryStore::new("distributions")), index.clone());

        store.save(&distribution("d1", "https://x/a.csv", None, None)).await.unwrap();
        store.save(&distribution("d2", "https://x/a.csv", None, None)).await.unwrap();
        assert_eq!(index.referencing("https://x/a.csv").await.unwrap(), vec!["d1", "d2"]);

        store.save(&distribution("d1", "https://x/b.csv", None, None)).await.unwrap();
        assert_eq!(index.referencing("https://x/a.csv").await.unwrap(), vec!["d2"]);
        assert_eq!(index.referencing("https://x/b.csv").await.unwrap(), vec!["d1"]);
    }
}
