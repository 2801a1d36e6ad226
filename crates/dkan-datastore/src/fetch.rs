//! Resource file fetching
//!
//! Localizes a resource: HTTP(S) sources are streamed to disk, `file://`
//! URIs and plain paths are copied. A copy already at the destination is
//! reused. Registration stages a fresh copy first, hashes it for the
//! version, then adopts it as the local file of that version.

use crate::resource::DataResource;
use dkan_common::checksum::md5_hex;
use dkan_common::{DkanError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct FileFetcher {
    client: reqwest::Client,
    files_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(files_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dkan-datastore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DkanError::network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            files_dir: files_dir.into(),
        })
    }

    /// Fetch `uri` into `destination`, returning the local path
    pub async fn fetch(&self, uri: &str, destination: &Path) -> Result<PathBuf> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            self.download(uri, destination).await?;
        } else {
            let source = local_path(uri)?;
            if !tokio::fs::try_exists(&source).await? {
                return Err(DkanError::not_found(format!("resource file {uri}")));
            }
            tokio::fs::copy(&source, destination).await?;
        }

        Ok(destination.to_path_buf())
    }

    /// Local copy of a source resource, fetched on first use
    pub async fn localize(&self, resource: &DataResource) -> Result<DataResource> {
        let destination = self.destination_for(resource);

        if is_cached(&destination).await {
            debug!(resource_id = %resource.identifier, path = %destination.display(), "Using cached copy");
        } else {
            info!(resource_id = %resource.identifier, uri = %resource.file_path, "Fetching resource");
            self.fetch(&resource.file_path, &destination).await?;
        }

        Ok(resource.local_copy(destination.to_string_lossy()))
    }

    /// Fetch `uri` into the staging area, before its version is known
    pub async fn stage(&self, uri: &str) -> Result<PathBuf> {
        let staged = self.files_dir.join("staging").join(md5_hex(uri));
        self.fetch(uri, &staged).await
    }

    /// Move a staged copy to the local path of `resource`; an existing copy
    /// of the same version wins
    pub async fn adopt(&self, staged: &Path, resource: &DataResource) -> Result<DataResource> {
        let destination = self.destination_for(resource);
        if is_cached(&destination).await {
            tokio::fs::remove_file(staged).await?;
        } else {
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(staged, &destination).await?;
        }
        Ok(resource.local_copy(destination.to_string_lossy()))
    }

    /// `<files_dir>/resources/<identifier>_<version>/<file name>`
    pub fn destination_for(&self, resource: &DataResource) -> PathBuf {
        let file_name = resource
            .file_path
            .split(['?', '#'])
            .next()
            .and_then(|p| p.rsplit('/').find(|s| !s.is_empty()))
            .filter(|name| !name.contains(':'))
            .unwrap_or("data.csv");

        self.files_dir
            .join("resources")
            .join(format!("{}_{}", resource.identifier, resource.version))
            .join(file_name)
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DkanError::network(format!("Failed to fetch {url}: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DkanError::not_found(format!("resource file {url}")));
        }
        if !response.status().is_success() {
            return Err(DkanError::network(format!(
                "Failed to fetch {url}: {}",
                response.status()
            )));
        }

        // Write to a temporary name so an interrupted download is never reused
        let partial = destination.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DkanError::network(format!("Failed to fetch {url}: {e}")))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, destination).await?;
        debug!(url = %url, bytes = downloaded, "Download complete");
        Ok(())
    }
}

fn local_path(uri: &str) -> Result<PathBuf> {
    if uri.starts_with("file://") {
        Url::parse(uri)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| DkanError::not_found(format!("resource file {uri}")))
    } else {
        Ok(PathBuf::from(uri))
    }
}

async fn is_cached(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
}
