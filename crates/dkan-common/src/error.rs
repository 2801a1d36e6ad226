//! Error types for DKAN

use thiserror::Error;

/// Result type alias for DKAN operations
pub type Result<T> = std::result::Result<T, DkanError>;

/// Main error type for DKAN
///
/// Structural and configuration errors abort the operation that raised them.
/// Per-item failures inside batch operations (harvest loads, post-import
/// chains) are recorded in result objects instead of being returned.
#[derive(Error, Debug)]
pub enum DkanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Source data could not be extracted (bad feed, empty feed, primitives)
    #[error("{0}")]
    Extraction(String),

    /// Harvest plan is malformed or references an unknown stage type
    #[error("Invalid harvest plan: {0}")]
    InvalidPlan(String),

    /// A transform rejected an item
    #[error("Transform error: {0}")]
    Transform(String),

    /// Data integrity violation, e.g. a resource no distribution references
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// A required setting is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Row or constraint failure while importing a resource
    #[error("Import error: {0}")]
    Import(String),

    /// Column limit, row size, or type conversion failure in the database
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl DkanError {
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Self::InvalidPlan(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_message_is_verbatim() {
        let err = DkanError::extraction("No Items were extracted.");
        assert_eq!(err.to_string(), "No Items were extracted.");
    }

    #[test]
    fn test_prefixed_messages() {
        assert_eq!(
            DkanError::config("sitewide dictionary not set").to_string(),
            "Configuration error: sitewide dictionary not set"
        );
        assert_eq!(
            DkanError::schema("Row size too large (> 8126)").to_string(),
            "Schema error: Row size too large (> 8126)"
        );
    }
}
