//! Data dictionaries
//!
//! A dictionary is a Frictionless-style table schema describing the columns
//! of a resource. [`discovery`] decides which dictionary applies to a
//! resource; [`alter`] rewrites the imported table to match it.

pub mod alter;
pub mod date_format;
pub mod discovery;

pub use alter::{AlterPlan, ColumnAction, ColumnChange};
pub use date_format::DateFormat;
pub use discovery::{DictionaryDiscovery, DictionaryOutcome};

use crate::database::{ColumnType, IndexKind};
use dkan_common::storage::JsonStoreExt;
use dkan_common::{DkanError, JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a resource's dictionary comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryMode {
    /// Dictionaries are not applied
    #[default]
    None,
    /// One dictionary for every resource
    Sitewide,
    /// Each distribution names its own through `describedBy`
    Reference,
}

impl std::str::FromStr for DictionaryMode {
    type Err = DkanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(DictionaryMode::None),
            "sitewide" => Ok(DictionaryMode::Sitewide),
            "reference" => Ok(DictionaryMode::Reference),
            other => Err(DkanError::config(format!("unknown dictionary mode '{other}'"))),
        }
    }
}

fn default_field_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DictionaryField {
    /// Column type for this field's Frictionless type
    pub fn column_type(&self) -> ColumnType {
        match self.field_type.to_lowercase().as_str() {
            "number" => ColumnType::Decimal,
            "integer" => ColumnType::Int,
            "boolean" => ColumnType::Bool,
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime,
            "time" => ColumnType::Time,
            "year" => ColumnType::Year,
            _ => ColumnType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fields: Vec<IndexField>,
    #[serde(rename = "type", default)]
    pub kind: IndexKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub fields: Vec<DictionaryField>,
    #[serde(default)]
    pub indexes: Vec<DictionaryIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDictionary {
    pub identifier: String,
    pub data: DictionaryData,
}

impl DataDictionary {
    pub fn field(&self, name: &str) -> Option<&DictionaryField> {
        self.data.fields.iter().find(|f| f.name == name)
    }
}

/// Dictionaries stored as `{identifier, data}` documents
#[derive(Clone)]
pub struct DictionaryStore {
    store: Arc<dyn JsonStore>,
}

impl DictionaryStore {
    pub fn new(store: Arc<dyn JsonStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<DataDictionary>> {
        self.store.retrieve_as(identifier).await
    }

    pub async fn save(&self, dictionary: &DataDictionary) -> Result<()> {
        if dictionary.data.fields.is_empty() {
            return Err(DkanError::schema(format!(
                "dictionary {} has no fields",
                dictionary.identifier
            )));
        }
        self.store.store_as(dictionary, &dictionary.identifier).await
    }

    pub async fn ids(&self) -> Result<Vec<String>> {
        self.store.ids().await
    }
}
