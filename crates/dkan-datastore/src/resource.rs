//! Data resources and the resource mapper
//!
//! A [`DataResource`] points at a tabular file. Its identifier is the MD5 of
//! the source path, its version is derived from content, and its perspective
//! says whether `file_path` is the original source or a local copy. The
//! [`ResourceMapper`] records every perspective under
//! `identifier__version__perspective`.

use dkan_common::checksum::{compute_file_checksum, md5_hex, sha256_hex};
use dkan_common::storage::JsonStoreExt;
use dkan_common::{JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const TSV_MIME: &str = "text/tab-separated-values";

/// Length of the hex version string
const VERSION_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Source,
    LocalFile,
}

impl Perspective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Perspective::Source => "source",
            Perspective::LocalFile => "local_file",
        }
    }
}

impl std::fmt::Display for Perspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResource {
    pub identifier: String,
    pub version: String,
    pub file_path: String,
    pub mime_type: String,
    pub perspective: Perspective,
}

impl DataResource {
    /// Source resource versioned by its descriptor until its content is
    /// known, see [`DataResource::with_content_version`]
    pub fn new(file_path: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let mime_type = mime_type.into();
        let version = short_hash(format!("{file_path}\n{mime_type}").as_bytes());
        Self {
            identifier: md5_hex(&file_path),
            version,
            file_path,
            mime_type,
            perspective: Perspective::Source,
        }
    }

    /// Version this resource by the bytes of `path`, a copy of its source
    pub async fn with_content_version(self, path: impl AsRef<Path>) -> Result<Self> {
        let mut checksum = compute_file_checksum(path).await?;
        checksum.truncate(VERSION_LEN);
        Ok(self.with_version(checksum))
    }

    /// Guess the mime type from the file extension
    pub fn guess_mime(file_path: &str) -> String {
        let lower = file_path.to_lowercase();
        let lower = lower.split(['?', '#']).next().unwrap_or_default();
        if lower.ends_with(".tsv") || lower.ends_with(".tab") {
            TSV_MIME.to_string()
        } else {
            mime::TEXT_CSV.to_string()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// `identifier__version__perspective`
    pub fn unique_identifier(&self) -> String {
        format!("{}__{}__{}", self.identifier, self.version, self.perspective)
    }

    /// `identifier__version`, the key jobs and tables are named after
    pub fn versioned_identifier(&self) -> String {
        format!("{}__{}", self.identifier, self.version)
    }

    /// The same resource as seen through a local copy
    pub fn local_copy(&self, local_path: impl Into<String>) -> Self {
        Self {
            file_path: local_path.into(),
            perspective: Perspective::LocalFile,
            ..self.clone()
        }
    }

    pub fn is_tab_separated(&self) -> bool {
        self.mime_type
            .parse::<mime::Mime>()
            .map(|m| m.essence_str() == TSV_MIME)
            .unwrap_or(false)
    }

    pub fn delimiter(&self) -> u8 {
        if self.is_tab_separated() {
            b'\t'
        } else {
            b','
        }
    }
}

fn short_hash(data: &[u8]) -> String {
    let mut hash = sha256_hex(data);
    hash.truncate(VERSION_LEN);
    hash
}

/// Registry of resources by identifier, version and perspective
#[derive(Clone)]
pub struct ResourceMapper {
    store: Arc<dyn JsonStore>,
}

impl ResourceMapper {
    pub fn new(store: Arc<dyn JsonStore>) -> Self {
        Self { store }
    }

    /// Record a resource; registering the same perspective again replaces it
    pub async fn register(&self, resource: &DataResource) -> Result<()> {
        debug!(
            resource_id = %resource.identifier,
            version = %resource.version,
            perspective = %resource.perspective,
            "Registering resource"
        );
        self.store
            .store_as(resource, &resource.unique_identifier())
            .await
    }

    pub async fn get(
        &self,
        identifier: &str,
        version: &str,
        perspective: Perspective,
    ) -> Result<Option<DataResource>> {
        self.store
            .retrieve_as(&format!("{identifier}__{version}__{perspective}"))
            .await
    }

    /// Every registered version of a resource in one perspective
    pub async fn versions(&self, identifier: &str, perspective: Perspective) -> Result<Vec<DataResource>> {
        let prefix = format!("{identifier}__");
        let suffix = format!("__{perspective}");
        let mut found = Vec::new();
        for (key, value) in self.store.retrieve_all().await? {
            if key.starts_with(&prefix) && key.ends_with(&suffix) {
                found.push(serde_json::from_value(value)?);
            }
        }
        Ok(found)
    }

    /// Forget every perspective of one resource version
    pub async fn remove(&self, identifier: &str, version: &str) -> Result<()> {
        for perspective in [Perspective::Source, Perspective::LocalFile] {
            self.store
                .remove(&format!("{identifier}__{version}__{perspective}"))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dkan_common::storage::MemoryStore;

    #[test]
    fn test_identifier_is_md5_of_path() {
        let r = DataResource::new("https://example.gov/parks.csv", "text/csv");
        assert_eq!(r.identifier, md5_hex("https://example.gov/parks.csv"));
        assert_eq!(r.version.len(), 16);
        assert_eq!(r.perspective, Perspective::Source);
        assert_eq!(
            r.unique_identifier(),
            format!("{}__{}__source", r.identifier, r.version)
        );
    }

    #[tokio::test]
    async fn test_content_version_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let resource = DataResource::new(path.to_string_lossy(), "text/csv");
        let first = resource.clone().with_content_version(&path).await.unwrap();
        let same = resource.clone().with_content_version(&path).await.unwrap();
        std::fs::write(&path, "a,b\n1,3\n").unwrap();
        let second = resource.with_content_version(&path).await.unwrap();

        assert_eq!(first.identifier, second.identifier);
        assert_eq!(first.version, same.version);
        assert_ne!(first.version, second.version);
        assert_eq!(second.version.len(), 16);
    }

    #[test]
    fn test_tab_separated_detection() {
        let tsv = DataResource::new("x.tsv", "text/tab-separated-values; charset=utf-8");
        assert!(tsv.is_tab_separated());
        assert_eq!(tsv.delimiter(), b'\t');
        assert_eq!(DataResource::new("x.csv", "text/csv").delimiter(), b',');
        assert_eq!(DataResource::guess_mime("https://x/y.TSV?dl=1"), TSV_MIME);
        assert_eq!(DataResource::guess_mime("y.csv"), "text/csv");
    }

    #[tokio::test]
    async fn test_mapper_keeps_perspectives_apart() {
        let mapper = ResourceMapper::new(Arc::new(MemoryStore::new("resources")));
        let source = DataResource::new("https://example.gov/parks.csv", "text/csv");
        let local = source.local_copy("/files/parks.csv");
        mapper.register(&source).await.unwrap();
        mapper.register(&local).await.unwrap();

        let found = mapper
            .get(&source.identifier, &source.version, Perspective::LocalFile)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.file_path, "/files/parks.csv");
        assert_eq!(mapper.versions(&source.identifier, Perspective::Source).await.unwrap().len(), 1);

        mapper.remove(&source.identifier, &source.version).await.unwrap();
        assert!(mapper
            .get(&source.identifier, &source.version, Perspective::Source)
            .await
            .unwrap()
            .is_none());
    }
}
