//! MySQL/InnoDB table limits
//!
//! Tables are checked against the limits of the production engine so an
//! import that would fail there fails here too.

use super::schema::TableSchema;
use dkan_common::{DkanError, Result};
use tracing::warn;

pub const MAX_IDENTIFIER_LENGTH: usize = 64;
/// Includes the `record_number` key column
pub const MAX_COLUMNS: usize = 1017;
pub const MAX_ROW_SIZE: u32 = 8126;
/// Bytes of the `record_number` key
pub const KEY_ROW_SIZE: u32 = 4;

pub const ROW_SIZE_ERROR: &str = "Row size too large (> 8126). Changing some columns to TEXT or \
BLOB or using ROW_FORMAT=DYNAMIC or ROW_FORMAT=COMPRESSED may help. In current row format, BLOB \
prefix of 768 bytes is stored inline.";

/// Declared row size of a schema plus its key
pub fn row_size(schema: &TableSchema) -> u32 {
    KEY_ROW_SIZE
        + schema
            .columns
            .iter()
            .map(|c| c.column_type.row_size())
            .sum::<u32>()
}

/// Check a schema against the engine limits
///
/// With `strict` off an oversized row only logs a warning, as the engine
/// does when strict mode is disabled.
pub fn check_schema(table: &str, schema: &TableSchema, strict: bool) -> Result<()> {
    if table.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DkanError::schema(format!(
            "Identifier name '{table}' is too long (maximum {MAX_IDENTIFIER_LENGTH})"
        )));
    }

    let columns = schema.columns.len() + 1;
    if columns > MAX_COLUMNS {
        return Err(DkanError::schema(format!(
            "Too many columns: {columns} (maximum {MAX_COLUMNS})"
        )));
    }

    if let Some(long) = schema
        .columns
        .iter()
        .find(|c| c.name.len() > MAX_IDENTIFIER_LENGTH)
    {
        return Err(DkanError::schema(format!(
            "Identifier name '{}' is too long (maximum {MAX_IDENTIFIER_LENGTH})",
            long.name
        )));
    }

    let size = row_size(schema);
    if size > MAX_ROW_SIZE {
        if strict {
            return Err(DkanError::schema(ROW_SIZE_ERROR));
        }
        warn!(table = %table, row_size = size, "Row size exceeds the strict limit; continuing with strict mode off");
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::database::schema::{ColumnSpec, ColumnType};

    fn text_schema(n: usize) -> TableSchema {
        TableSchema::text_columns(&(0..n).map(|i| format!("c{i}")).collect::<Vec<_>>())
    }

    #[test]
    fn test_ten_text_columns_fit() {
        assert_eq!(row_size(&text_schema(10)), 7684);
        assert!(check_schema("t", &text_schema(10), true).is_ok());
    }

    #[test]
    fn test_eleven_text_columns_too_large_when_strict() {
        let err = check_schema("t", &text_schema(11), true).unwrap_err();
        assert!(err.to_string().contains("Row size too large"));
        assert!(check_schema("t", &text_schema(11), false).is_ok());
    }

    #[test]
    fn test_typed_columns_shrink_row() {
        let mut schema = text_schema(11);
        schema.columns[0] = ColumnSpec::new("c0", ColumnType::Int);
        assert!(check_schema("t", &schema, true).is_ok());
    }

    #[test]
    fn test_column_limit() {
        let err = check_schema("t", &text_schema(MAX_COLUMNS), false).unwrap_err();
        assert!(err.to_string().contains("Too many columns: 1018"));
        assert!(check_schema("t", &text_schema(MAX_COLUMNS - 1), false).is_ok());
    }
}
