//! Table alteration from a data dictionary
//!
//! [`AlterPlan::build`] compares a table's current schema with a dictionary.
//! The plan is executed against SQLite by rebuilding the table with values
//! converted in Rust, and can also be rendered as the equivalent MySQL
//! statements.

use super::date_format::DateFormat;
use super::DataDictionary;
use crate::database::limits::MAX_IDENTIFIER_LENGTH;
use crate::database::table::CellValue;
use crate::database::{ColumnSpec, ColumnType, DatabaseTable, IndexKind, IndexSpec, TableSchema};
use dkan_common::{DkanError, Result};
use std::collections::HashMap;
use tracing::info;

/// Prefix length for indexes over text columns without an explicit length
const DEFAULT_INDEX_PREFIX: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAction {
    Retype,
    Add,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub column: String,
    pub action: ColumnAction,
    pub from: Option<ColumnType>,
    pub to: ColumnType,
    pub format: Option<DateFormat>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterPlan {
    pub table: String,
    pub dictionary: String,
    pub changes: Vec<ColumnChange>,
    pub indexes: Vec<IndexSpec>,
    /// Explicit prefix lengths per (index, field)
    pub index_lengths: HashMap<(String, String), u32>,
    /// Schema of the table once the plan has run
    pub target: TableSchema,
}

impl AlterPlan {
    /// Plan the changes that make `current` match `dictionary`
    ///
    /// Columns the dictionary does not mention are left alone.
    pub fn build(table: &str, current: &TableSchema, dictionary: &DataDictionary) -> Result<Self> {
        let mut target = current.clone();
        target.indexes.clear();
        let mut changes = Vec::new();

        for field in &dictionary.data.fields {
            if field.name.len() > MAX_IDENTIFIER_LENGTH {
                return Err(DkanError::schema(format!(
                    "Identifier name '{}' is too long (maximum {MAX_IDENTIFIER_LENGTH})",
                    field.name
                )));
            }

            let to = field.column_type();
            let format = DateFormat::for_field(field.format.as_deref(), to)?;
            let description = field.description.clone().or_else(|| field.title.clone());

            match target.columns.iter_mut().find(|c| c.name == field.name) {
                Some(column) => {
                    let from = column.column_type;
                    column.description = description.clone();
                    if from != to {
                        column.column_type = to;
                        changes.push(ColumnChange {
                            column: field.name.clone(),
                            action: ColumnAction::Retype,
                            from: Some(from),
                            to,
                            format,
                            description,
                        });
                    }
                }
                None => {
                    target.columns.push(ColumnSpec {
                        name: field.name.clone(),
                        column_type: to,
                        nullable: true,
                        description: description.clone(),
                    });
                    changes.push(ColumnChange {
                        column: field.name.clone(),
                        action: ColumnAction::Add,
                        from: None,
                        to,
                        format,
                        description,
                    });
                }
            }
        }

        let mut indexes = Vec::new();
        let mut index_lengths = HashMap::new();
        for (i, index) in dictionary.data.indexes.iter().enumerate() {
            let name = index.name.clone().unwrap_or_else(|| format!("index{}", i + 1));
            for field in &index.fields {
                if target.column(&field.name).is_none() {
                    return Err(DkanError::schema(format!(
                        "index {name} references unknown column '{}'",
                        field.name
                    )));
                }
                if let Some(length) = field.length {
                    index_lengths.insert((name.clone(), field.name.clone()), length);
                }
            }
            indexes.push(IndexSpec {
                name,
                fields: index.fields.iter().map(|f| f.name.clone()).collect(),
                kind: index.kind,
            });
        }
        target.indexes = indexes.clone();

        Ok(Self {
            table: table.to_string(),
            dictionary: dictionary.identifier.clone(),
            changes,
            indexes,
            index_lengths,
            target,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.indexes.is_empty()
    }

    /// Rebuild `table` with the target schema, converting every stored value
    ///
    /// Returns the number of rows converted.
    pub async fn execute(&self, table: &DatabaseTable) -> Result<usize> {
        let current = table.schema().await?;
        let existing = current.column_names();
        let rows = table.text_rows(&existing).await?;

        let changed: HashMap<&str, &ColumnChange> = self
            .changes
            .iter()
            .map(|c| (c.column.as_str(), c))
            .collect();
        let positions: HashMap<&str, usize> = existing
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut converted = Vec::with_capacity(rows.len());
        for (record, values) in rows {
            let mut out = Vec::with_capacity(self.target.columns.len());
            for column in &self.target.columns {
                let raw = positions
                    .get(column.name.as_str())
                    .and_then(|&i| values.get(i))
                    .and_then(|v| v.as_deref());
                let Some(change) = changed.get(column.name.as_str()) else {
                    out.push(raw.map_or(CellValue::Null, |v| CellValue::Text(v.to_string())));
                    continue;
                };
                let value = convert_value(raw, change.to, change.format.as_ref()).map_err(|reason| {
                    DkanError::schema(format!(
                        "Invalid value '{}' for column '{}' ({}) at record {}: {}",
                        raw.unwrap_or_default(),
                        column.name,
                        column.column_type,
                        record,
                        reason
                    ))
                })?;
                out.push(value);
            }
            converted.push((record, out));
        }

        let count = converted.len();
        table.rebuild(&self.target, converted).await?;
        info!(
            table = %self.table,
            dictionary = %self.dictionary,
            changes = self.changes.len(),
            indexes = self.indexes.len(),
            rows = count,
            "Applied data dictionary"
        );
        Ok(count)
    }

    /// The plan as MySQL statements
    pub fn mysql_statements(&self) -> Vec<String> {
        let table = backtick(&self.table);
        let mut statements = Vec::new();

        for change in self.changes.iter().filter(|c| c.action == ColumnAction::Retype) {
            if change.to.is_text() {
                continue;
            }
            let column = backtick(&change.column);
            statements.push(format!("UPDATE {table} SET {column} = NULL WHERE {column} = '';"));
            if let Some(format) = &change.format {
                statements.push(format!(
                    "UPDATE {table} SET {column} = STR_TO_DATE({column}, '{}');",
                    escape(&format.mysql)
                ));
            }
        }

        let clauses: Vec<String> = self
            .changes
            .iter()
            .map(|change| {
                let verb = match change.action {
                    ColumnAction::Retype => "MODIFY COLUMN",
                    ColumnAction::Add => "ADD COLUMN",
                };
                let comment = change
                    .description
                    .as_deref()
                    .map(|d| format!(" COMMENT '{}'", escape(d)))
                    .unwrap_or_default();
                format!("{verb} {} {}{comment}", backtick(&change.column), change.to.sql())
            })
            .collect();
        if !clauses.is_empty() {
            statements.push(format!("ALTER TABLE {table} {};", clauses.join(", ")));
        }

        for index in &self.indexes {
            let fields: Vec<String> = index
                .fields
                .iter()
                .map(|field| self.index_field(index, field))
                .collect();
            let kind = match index.kind {
                IndexKind::Index => "INDEX",
                IndexKind::Fulltext => "FULLTEXT INDEX",
            };
            statements.push(format!(
                "CREATE {kind} {} ON {table} ({});",
                backtick(&index.name),
                fields.join(", ")
            ));
        }

        statements
    }

    fn index_field(&self, index: &IndexSpec, field: &str) -> String {
        let explicit = self.index_lengths.get(&(index.name.clone(), field.to_string()));
        let is_text = self
            .target
            .column(field)
            .is_some_and(|c| c.column_type.is_text());
        match (index.kind, explicit) {
            (IndexKind::Index, Some(length)) => format!("{}({length})", backtick(field)),
            (IndexKind::Index, None) if is_text => {
                format!("{}({DEFAULT_INDEX_PREFIX})", backtick(field))
            }
            _ => backtick(field),
        }
    }
}

/// Convert a stored text value to a typed cell
pub fn convert_value(
    raw: Option<&str>,
    column_type: ColumnType,
    format: Option<&DateFormat>,
) -> std::result::Result<CellValue, String> {
    let Some(raw) = raw else {
        return Ok(CellValue::Null);
    };
    if column_type.is_text() {
        return Ok(CellValue::Text(raw.to_string()));
    }

    let value = raw.trim();
    if value.is_empty() {
        return Ok(CellValue::Null);
    }

    match column_type {
        ColumnType::Int => value
            .parse::<i32>()
            .map(|i| CellValue::Integer(i.into()))
            .map_err(|e| e.to_string()),
        ColumnType::BigInt => value
            .parse::<i64>()
            .map(CellValue::Integer)
            .map_err(|e| e.to_string()),
        ColumnType::Decimal => value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(CellValue::Real)
            .ok_or_else(|| "not a number".to_string()),
        ColumnType::Bool => match value.to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" => Ok(CellValue::Integer(1)),
            "0" | "false" | "f" | "no" | "n" => Ok(CellValue::Integer(0)),
            _ => Err("not a boolean".to_string()),
        },
        ColumnType::Year => match value.parse::<i64>() {
            Ok(year) if year == 0 || (1901..=2155).contains(&year) => Ok(CellValue::Integer(year)),
            _ => Err("not a year between 1901 and 2155".to_string()),
        },
        ColumnType::Date => format
            .and_then(|f| f.parse_date(value))
            .map(|d| CellValue::Text(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| expected(format)),
        ColumnType::DateTime => format
            .and_then(|f| f.parse_datetime(value))
            .map(|d| CellValue::Text(d.format("%Y-%m-%d %H:%M:%S").to_string()))
            .ok_or_else(|| expected(format)),
        ColumnType::Time => format
            .and_then(|f| f.parse_time(value))
            .map(|t| CellValue::Text(t.format("%H:%M:%S").to_string()))
            .ok_or_else(|| expected(format)),
        ColumnType::Text | ColumnType::Varchar(_) => Ok(CellValue::Text(raw.to_string())),
    }
}

fn expected(format: Option<&DateFormat>) -> String {
    match format {
        Some(f) => format!("does not match format '{}'", f.source),
        None => "no format available".to_string(),
    }
}

fn backtick(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dictionary() -> DataDictionary {
        serde_json::from_value(json!({
            "identifier": "inspections",
            "data": {
                "fields": [
                    {"name": "name", "type": "string", "description": "Business name"},
                    {"name": "inspected", "type": "date", "format": "%m/%d/%Y"},
                    {"name": "score", "type": "integer"},
                    {"name": "grade", "type": "string", "title": "Letter grade"}
                ],
                "indexes": [
                    {"name": "by_name", "fields": [{"name": "name"}]},
                    {"fields": [{"name": "grade", "length": 1}, {"name": "score"}]}
                ]
            }
        }))
        .unwrap()
    }

    fn current() -> TableSchema {
        TableSchema::text_columns(&[
            "name".to_string(),
            "inspected".to_string(),
            "score".to_string(),
        ])
    }

    #[test]
    fn test_build_retypes_and_adds() {
        let plan = AlterPlan::build("datastore_x", &current(), &dictionary()).unwrap();

        let summary: Vec<(&str, ColumnAction, ColumnType)> = plan
            .changes
            .iter()
            .map(|c| (c.column.as_str(), c.action, c.to))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("inspected", ColumnAction::Retype, ColumnType::Date),
                ("score", ColumnAction::Retype, ColumnType::Int),
                ("grade", ColumnAction::Add, ColumnType::Text),
            ]
        );
        assert_eq!(plan.target.column_names(), vec!["name", "inspected", "score", "grade"]);
        assert_eq!(plan.indexes[1].name, "index2");
    }

    #[test]
    fn test_unknown_index_column_rejected() {
        let mut dict = dictionary();
        dict.data.indexes[0].fields[0].name = "zip".into();
        let err = AlterPlan::build("t", &current(), &dict).unwrap_err();
        assert!(err.to_string().contains("'zip'"));
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let mut dict = dictionary();
        dict.data.fields[1].format = Some("%Y-%m-%d %Z".into());
        assert!(AlterPlan::build("t", &current(), &dict).is_err());
    }

    #[test]
    fn test_mysql_rendering() {
        let plan = AlterPlan::build("datastore_x", &current(), &dictionary()).unwrap();
        let sql = plan.mysql_statements();
        assert_eq!(
            sql,
            vec![
                "UPDATE `datastore_x` SET `inspected` = NULL WHERE `inspected` = '';",
                "UPDATE `datastore_x` SET `inspected` = STR_TO_DATE(`inspected`, '%m/%d/%Y');",
                "UPDATE `datastore_x` SET `score` = NULL WHERE `score` = '';",
                "ALTER TABLE `datastore_x` MODIFY COLUMN `inspected` DATE, MODIFY COLUMN `score` INT, ADD COLUMN `grade` TEXT COMMENT 'Letter grade';",
                "CREATE INDEX `by_name` ON `datastore_x` (`name`(50));",
                "CREATE INDEX `index2` ON `datastore_x` (`grade`(1), `score`);",
            ]
        );
    }

    #[test]
    fn test_convert_values() {
        let date = DateFormat::parse("%m/%d/%Y").unwrap();
        assert_eq!(
            convert_value(Some("07/04/2021"), ColumnType::Date, Some(&date)).unwrap(),
            CellValue::Text("2021-07-04".into())
        );
        assert_eq!(convert_value(Some(" "), ColumnType::Date, Some(&date)).unwrap(), CellValue::Null);
        assert!(convert_value(Some("2021-07-04"), ColumnType::Date, Some(&date)).is_err());

        assert_eq!(convert_value(Some("42"), ColumnType::Int, None).unwrap(), CellValue::Integer(42));
        assert!(convert_value(Some("3000000000"), ColumnType::Int, None).is_err());
        assert_eq!(
            convert_value(Some("3000000000"), ColumnType::BigInt, None).unwrap(),
            CellValue::Integer(3_000_000_000)
        );
        assert_eq!(convert_value(Some("1.5"), ColumnType::Decimal, None).unwrap(), CellValue::Real(1.5));
        assert_eq!(convert_value(Some("Yes"), ColumnType::Bool, None).unwrap(), CellValue::Integer(1));
        assert!(convert_value(Some("1899"), ColumnType::Year, None).is_err());
        assert_eq!(convert_value(Some(""), ColumnType::Text, None).unwrap(), CellValue::Text(String::new()));
        assert_eq!(convert_value(None, ColumnType::Int, None).unwrap(), CellValue::Null);
    }
}
