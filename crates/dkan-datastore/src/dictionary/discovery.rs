//! Which dictionary applies to a resource

use super::DictionaryMode;
use crate::config::DictionaryConfig;
use crate::metastore::DistributionStore;
use crate::resource::{Perspective, ResourceMapper};
use dkan_common::{DkanError, Result};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionaryOutcome {
    /// Dictionary enforcement is turned off
    Disabled,
    Dictionary(String),
    /// The resource's distribution does not describe itself with a dictionary
    NoDictionary,
}

pub struct DictionaryDiscovery {
    config: DictionaryConfig,
    mapper: ResourceMapper,
    distributions: DistributionStore,
}

impl DictionaryDiscovery {
    pub fn new(config: DictionaryConfig, mapper: ResourceMapper, distributions: DistributionStore) -> Self {
        Self {
            config,
            mapper,
            distributions,
        }
    }

    pub fn mode(&self) -> DictionaryMode {
        self.config.mode
    }

    pub async fn dictionary_id_for_resource(
        &self,
        resource_id: &str,
        version: &str,
    ) -> Result<DictionaryOutcome> {
        match self.config.mode {
            DictionaryMode::None => Ok(DictionaryOutcome::Disabled),
            DictionaryMode::Sitewide => self
                .config
                .sitewide_id
                .clone()
                .map(DictionaryOutcome::Dictionary)
                .ok_or_else(|| {
                    DkanError::config("sitewide dictionary mode is enabled but no dictionary id is set")
                }),
            DictionaryMode::Reference => self.from_reference(resource_id, version).await,
        }
    }

    async fn from_reference(&self, resource_id: &str, version: &str) -> Result<DictionaryOutcome> {
        let resource = self
            .mapper
            .get(resource_id, version, Perspective::Source)
            .await?
            .ok_or_else(|| {
                DkanError::lookup(format!("resource {resource_id}__{version} is not registered"))
            })?;

        let referencing = self.distributions.index().referencing(&resource.file_path).await?;
        let Some(distribution_id) = referencing.first() else {
            return Err(DkanError::lookup(format!(
                "no distribution references {}",
                resource.file_path
            )));
        };

        let distribution = self
            .distributions
            .get(distribution_id)
            .await?
            .ok_or_else(|| DkanError::lookup(format!("distribution {distribution_id} is missing")))?;

        let outcome = match distribution.dictionary_id() {
            Some(id) => DictionaryOutcome::Dictionary(id),
            None => DictionaryOutcome::NoDictionary,
        };
        debug!(resource_id = %resource_id, distribution_id = %distribution_id, outcome = ?outcome, "Resolved dictionary");
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::metastore::{Distribution, DistributionData, ReferenceIndex, TABLE_SCHEMA_MEDIA_TYPE};
    use crate::resource::DataResource;
    use dkan_common::storage::MemoryStore;
    use std::sync::Arc;

    struct Fixture {
        mapper: ResourceMapper,
        distributions: DistributionStore,
        resource: DataResource,
    }

    async fn fixture() -> Fixture {
        let mapper = ResourceMapper::new(Arc::new(MemoryStore::new("resources")));
        let index = ReferenceIndex::new(Arc::new(MemoryStore::new("refs")));
        let distributions = DistributionStore::new(Arc::new(MemoryStore::new("distributions")), index);
        let resource = DataResource::new("https://data.example.gov/files/inspections.csv", "text/csv");
        mapper.register(&resource).await.unwrap();
        Fixture {
            mapper,
            distributions,
            resource,
        }
    }

    fn discovery(f: &Fixture, mode: DictionaryMode, sitewide: Option<&str>) -> DictionaryDiscovery {
        DictionaryDiscovery::new(
            DictionaryConfig {
                mode,
                sitewide_id: sitewide.map(str::to_string),
            },
            f.mapper.clone(),
            f.distributions.clone(),
        )
    }

    #[tokio::test]
    async fn test_none_mode_is_disabled() {
        let f = fixture().await;
        let d = discovery(&f, DictionaryMode::None, Some("ignored"));
        let outcome = d.dictionary_id_for_resource("x", "y").await.unwrap();
        assert_eq!(outcome, DictionaryOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_sitewide_mode() {
        let f = fixture().await;
        let d = discovery(&f, DictionaryMode::Sitewide, Some("site-dict"));
        assert_eq!(
            d.dictionary_id_for_resource("x", "y").await.unwrap(),
            DictionaryOutcome::Dictionary("site-dict".into())
        );

        let d = discovery(&f, DictionaryMode::Sitewide, None);
        assert!(matches!(
            d.dictionary_id_for_resource("x", "y").await,
            Err(DkanError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_reference_without_distribution_is_lookup_error() {
        let f = fixture().await;
        let d = discovery(&f, DictionaryMode::Reference, None);
        let err = d
            .dictionary_id_for_resource(&f.resource.identifier, &f.resource.version)
            .await
            .unwrap_err();
        assert!(matches!(err, DkanError::Lookup(_)));
    }

    #[tokio::test]
    async fn test_reference_follows_described_by() {
        let f = fixture().await;
        f.distributions
            .save(&Distribution {
                identifier: "dist-1".into(),
                data: DistributionData {
                    download_url: Some(f.resource.file_path.clone()),
                    media_type: Some("text/csv".into()),
                    described_by: Some("https://data.example.gov/api/1/metastore/schemas/data-dictionary/items/dict-9".into()),
                    described_by_type: Some(TABLE_SCHEMA_MEDIA_TYPE.into()),
                },
            })
            .await
            .unwrap();

        let d = discovery(&f, DictionaryMode::Reference, None);
        assert_eq!(
            d.dictionary_id_for_resource(&f.resource.identifier, &f.resource.version)
                .await
                .unwrap(),
            DictionaryOutcome::Dictionary("dict-9".into())
        );
    }

    #[tokio::test]
    async fn test_reference_with_other_media_type_has_no_dictionary() {
        let f = fixture().await;
        f.distributions
            .save(&Distribution {
                identifier: "dist-1".into(),
                data: DistributionData {
                    download_url: Some(f.resource.file_path.clone()),
                    described_by: Some("https://example.gov/readme.pdf".into()),
                    described_by_type: Some("application/pdf".into()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let d = discovery(&f, DictionaryMode::Reference, None);
        assert_eq!(
            d.dictionary_id_for_resource(&f.resource.identifier, &f.resource.version)
                .await
                .unwrap(),
            DictionaryOutcome::NoDictionary
        );
    }
}
