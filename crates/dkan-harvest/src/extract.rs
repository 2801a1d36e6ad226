//! Extract stage
//!
//! An extractor produces the raw items of a source. [`Extract::run`] turns
//! them into an ordered map keyed by normalized identifier, rejecting empty
//! sources and anything that is not a JSON object.

use crate::plan::StageSpec;
use async_trait::async_trait;
use dkan_common::{DkanError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

/// Default property holding the item list in a data.json catalog
pub const DEFAULT_COLLECTION: &str = "dataset";

/// Source of harvest items
#[async_trait]
pub trait Extract: Send + Sync {
    /// Raw items exactly as found in the source
    async fn get_items(&self) -> Result<Vec<Value>>;

    /// Property of each item holding its identifier
    fn identifier_field(&self) -> &str {
        "identifier"
    }

    /// Extract and index items by normalized identifier
    async fn run(&self) -> Result<IndexMap<String, Value>> {
        let items = self.get_items().await?;
        index_items(items, self.identifier_field())
    }
}

/// Validate raw items and key them by identifier, preserving source order
pub fn index_items(items: Vec<Value>, identifier_field: &str) -> Result<IndexMap<String, Value>> {
    if items.is_empty() {
        return Err(DkanError::extraction("No Items were extracted."));
    }

    let mut indexed = IndexMap::with_capacity(items.len());
    for item in items {
        if !item.is_object() {
            return Err(DkanError::extraction(format!(
                "Item is not a structured object: {item}"
            )));
        }

        let raw_id = match item.get(identifier_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(DkanError::extraction(format!(
                    "Item has no '{identifier_field}' property: {item}"
                )))
            }
        };

        let id = normalize_identifier(&raw_id);
        if id.is_empty() {
            return Err(DkanError::extraction(format!(
                "Item has an empty '{identifier_field}': {item}"
            )));
        }

        // Later duplicates replace earlier ones but keep the first position
        if indexed.insert(id.clone(), item).is_some() {
            warn!(identifier = %id, "Duplicate identifier in source, keeping the last occurrence");
        }
    }

    Ok(indexed)
}

/// Trim an identifier; URL-like identifiers reduce to their last path segment
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        if let Ok(url) = Url::parse(trimmed) {
            if let Some(last) = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            {
                return last.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Extractor for DCAT-US `data.json` catalogs
///
/// `uri` may be a plain path, a `file://` URI or an HTTP(S) URL. The
/// `collection` option names the array holding the items.
#[derive(Debug, Clone)]
pub struct DataJsonExtract {
    uri: String,
    collection: String,
    client: reqwest::Client,
}

impl DataJsonExtract {
    pub fn new(uri: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            uri: uri.into(),
            collection: DEFAULT_COLLECTION.to_string(),
            client,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Build from a plan stage; the stage must carry a `uri`
    pub fn from_spec(spec: &StageSpec, client: reqwest::Client) -> Result<Self> {
        let uri = spec.uri.as_deref().filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            DkanError::invalid_plan(format!("extract stage requires a 'uri': {}", spec.to_json()))
        })?;

        let mut extract = Self::new(uri.trim(), client);
        if let Some(collection) = spec.option_str("collection") {
            extract = extract.with_collection(collection);
        }
        Ok(extract)
    }

    async fn fetch_body(&self) -> Result<String> {
        if self.uri.starts_with("http://") || self.uri.starts_with("https://") {
            debug!(uri = %self.uri, "Fetching catalog over HTTP");
            let response = self
                .client
                .get(&self.uri)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| DkanError::extraction(format!("Failed to fetch {}: {}", self.uri, e)))?;
            return response
                .text()
                .await
                .map_err(|e| DkanError::extraction(format!("Failed to read {}: {}", self.uri, e)));
        }

        let path = if self.uri.starts_with("file://") {
            Url::parse(&self.uri)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| DkanError::extraction(format!("Invalid file URI: {}", self.uri)))?
        } else {
            PathBuf::from(&self.uri)
        };

        debug!(path = %path.display(), "Reading catalog from disk");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DkanError::extraction(format!("Unable to read {}: {}", self.uri, e)))
    }
}

#[async_trait]
impl Extract for DataJsonExtract {
    async fn get_items(&self) -> Result<Vec<Value>> {
        let body = self.fetch_body().await?;
        let catalog: Value = serde_json::from_str(&body)
            .map_err(|e| DkanError::extraction(format!("Invalid JSON in {}: {}", self.uri, e)))?;

        match catalog.get(&self.collection) {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(DkanError::extraction(format!(
                "{} has no '{}' array",
                self.uri, self.collection
            ))),
        }
    }
}
