//! CSV header to column name conversion

use super::limits::{MAX_COLUMNS, MAX_IDENTIFIER_LENGTH};
use dkan_common::{DkanError, Result};
use regex::Regex;
use std::collections::HashSet;

/// Primary key of every imported table
pub const RECORD_NUMBER: &str = "record_number";

const BOM: char = '\u{feff}';

/// MySQL reserved words that imported headers commonly collide with
const RESERVED_WORDS: &[&str] = &[
    "accessible", "add", "all", "alter", "analyze", "and", "as", "asc", "before", "between",
    "bigint", "binary", "blob", "both", "by", "call", "cascade", "case", "change", "char",
    "character", "check", "collate", "column", "condition", "constraint", "continue", "convert",
    "create", "cross", "current_date", "current_time", "current_timestamp", "current_user",
    "cursor", "database", "databases", "dec", "decimal", "declare", "default", "delayed",
    "delete", "desc", "describe", "distinct", "div", "double", "drop", "each", "else", "elseif",
    "enclosed", "escaped", "exists", "exit", "explain", "false", "fetch", "float", "for", "force",
    "foreign", "from", "fulltext", "function", "generated", "grant", "group", "groups", "having",
    "high_priority", "if", "ignore", "in", "index", "infile", "inner", "inout", "insert", "int",
    "integer", "interval", "into", "is", "iterate", "join", "key", "keys", "kill", "lag", "lead",
    "leading", "leave", "left", "like", "limit", "linear", "lines", "load", "localtime", "lock",
    "long", "loop", "match", "mod", "natural", "not", "null", "numeric", "of", "on", "optimize",
    "option", "or", "order", "out", "outer", "over", "partition", "precision", "primary",
    "procedure", "purge", "range", "rank", "read", "real", "references", "regexp", "release",
    "rename", "repeat", "replace", "require", "restrict", "return", "revoke", "right", "rlike",
    "row", "rows", "schema", "schemas", "select", "separator", "set", "show", "signal",
    "smallint", "spatial", "sql", "ssl", "starting", "stored", "table", "terminated", "then",
    "to", "trailing", "trigger", "true", "undo", "union", "unique", "unlock", "unsigned",
    "update", "usage", "use", "using", "values", "varchar", "varying", "virtual", "when",
    "where", "while", "window", "with", "write", "xor", "year_month", "zerofill",
];

/// Turns raw header cells into unique, engine-safe column names
#[derive(Debug)]
pub struct HeaderSanitizer {
    invalid: Regex,
}

impl HeaderSanitizer {
    pub fn new() -> Result<Self> {
        let invalid = Regex::new(r"[^a-z0-9_]+")
            .map_err(|e| DkanError::schema(format!("header pattern: {e}")))?;
        Ok(Self { invalid })
    }

    /// One header cell to a column name, without uniqueness
    pub fn sanitize(&self, raw: &str) -> String {
        let lower = raw.trim_start_matches(BOM).trim().to_lowercase();
        let cleaned = self.invalid.replace_all(&lower, "_");
        let mut name = cleaned.trim_matches('_').to_string();

        if name.is_empty() {
            name = "unnamed".to_string();
        }
        if RESERVED_WORDS.contains(&name.as_str()) {
            name.push('_');
        }
        name.truncate(MAX_IDENTIFIER_LENGTH);
        name
    }

    /// Column names for a full header row
    ///
    /// Collisions get `_01`, `_02`, ... suffixes, truncating first so the
    /// result stays within the identifier limit.
    pub fn columns(&self, header: &[String]) -> Result<Vec<String>> {
        if header.len() + 1 > MAX_COLUMNS {
            return Err(DkanError::schema(format!(
                "Too many columns: {} (maximum {MAX_COLUMNS})",
                header.len() + 1
            )));
        }

        let mut used: HashSet<String> = HashSet::from([RECORD_NUMBER.to_string()]);
        let mut columns = Vec::with_capacity(header.len());

        for raw in header {
            let base = self.sanitize(raw);
            let mut name = base.clone();
            let mut n = 1;
            while used.contains(&name) {
                let suffix = format!("_{n:02}");
                let mut stem = base.clone();
                stem.truncate(MAX_IDENTIFIER_LENGTH - suffix.len());
                name = format!("{stem}{suffix}");
                n += 1;
            }
            used.insert(name.clone());
            columns.push(name);
        }

        Ok(columns)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize() {
        let s = HeaderSanitizer::new().unwrap();
        assert_eq!(s.sanitize("\u{feff}Zip Code"), "zip_code");
        assert_eq!(s.sanitize("  Amount ($) "), "amount");
        assert_eq!(s.sanitize("% Change / Year"), "change_year");
        assert_eq!(s.sanitize("Order"), "order_");
        assert_eq!(s.sanitize("???"), "unnamed");
        assert_eq!(s.sanitize("Column"), "column_");
    }

    #[test]
    fn test_truncates_to_identifier_limit() {
        let s = HeaderSanitizer::new().unwrap();
        let long = "a".repeat(100);
        assert_eq!(s.sanitize(&long).len(), MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_collisions_get_numeric_suffixes() {
        let s = HeaderSanitizer::new().unwrap();
        let cols = s
            .columns(&header(&["Name", "name", "NAME ", "record_number"]))
            .unwrap();
        assert_eq!(cols, vec!["name", "name_01", "name_02", "record_number_01"]);
    }

    #[test]
    fn test_long_collisions_stay_within_limit() {
        let s = HeaderSanitizer::new().unwrap();
        let prefix = "x".repeat(70);
        let cols = s
            .columns(&header(&[&format!("{prefix}a"), &format!("{prefix}b")]))
            .unwrap();
        assert_eq!(cols[0].len(), 64);
        assert_eq!(cols[1].len(), 64);
        assert!(cols[1].ends_with("_01"));
        assert_ne!(cols[0], cols[1]);
    }

    #[test]
    fn test_too_many_columns() {
        let s = HeaderSanitizer::new().unwrap();
        let wide: Vec<String> = (0..MAX_COLUMNS).map(|i| format!("c{i}")).collect();
        let err = s.columns(&wide).unwrap_err();
        assert!(matches!(err, DkanError::Schema(_)));
    }
}
