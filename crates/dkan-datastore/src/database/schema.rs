//! Column types and table schemas

use dkan_common::{DkanError, Result};
use serde::{Deserialize, Serialize};

/// Inline bytes a TEXT column occupies in a compact row
pub const TEXT_INLINE_PREFIX: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Varchar(u32),
    Int,
    BigInt,
    Decimal,
    Date,
    DateTime,
    Time,
    Year,
    Bool,
}

impl ColumnType {
    /// Declared type, shared by SQLite and MySQL
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Text => "TEXT".into(),
            ColumnType::Varchar(n) => format!("VARCHAR({n})"),
            ColumnType::Int => "INT".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Decimal => "DECIMAL".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::DateTime => "DATETIME".into(),
            ColumnType::Time => "TIME".into(),
            ColumnType::Year => "YEAR".into(),
            ColumnType::Bool => "BOOL".into(),
        }
    }

    /// Parse a declared type as reported by the database
    pub fn parse(declared: &str) -> Result<Self> {
        let upper = declared.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or_default().trim();
        let ty = match base {
            "TEXT" | "LONGTEXT" | "MEDIUMTEXT" => ColumnType::Text,
            "VARCHAR" | "CHAR" => {
                let len = upper
                    .split(['(', ')'])
                    .nth(1)
                    .and_then(|n| n.trim().parse().ok())
                    .ok_or_else(|| DkanError::schema(format!("missing length in {declared}")))?;
                ColumnType::Varchar(len)
            }
            "INT" | "INTEGER" | "SMALLINT" | "TINYINT" | "MEDIUMINT" => ColumnType::Int,
            "BIGINT" => ColumnType::BigInt,
            "DECIMAL" | "NUMERIC" | "FLOAT" | "DOUBLE" | "REAL" => ColumnType::Decimal,
            "DATE" => ColumnType::Date,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            "TIME" => ColumnType::Time,
            "YEAR" => ColumnType::Year,
            "BOOL" | "BOOLEAN" => ColumnType::Bool,
            _ => return Err(DkanError::schema(format!("unsupported column type {declared}"))),
        };
        Ok(ty)
    }

    /// Bytes counted against the row size limit
    pub fn row_size(&self) -> u32 {
        match self {
            ColumnType::Text => TEXT_INLINE_PREFIX,
            ColumnType::Varchar(n) => (n * 4 + 2).min(TEXT_INLINE_PREFIX + 2),
            ColumnType::Int => 4,
            ColumnType::BigInt => 8,
            ColumnType::Decimal => 16,
            ColumnType::Date => 3,
            ColumnType::DateTime => 8,
            ColumnType::Time => 3,
            ColumnType::Year => 1,
            ColumnType::Bool => 1,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Varchar(_))
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnSpec {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
            nullable: true,
            description: None,
        }
    }

    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            column_type,
            ..Self::text(name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Index,
    Fulltext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub kind: IndexKind,
}

/// Columns of a dynamic table, excluding the `record_number` key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl TableSchema {
    /// All-TEXT schema for freshly imported columns
    pub fn text_columns(names: &[String]) -> Self {
        Self {
            columns: names.iter().map(ColumnSpec::text).collect(),
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
