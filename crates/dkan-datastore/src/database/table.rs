//! Dynamic-schema tables
//!
//! Every table has an auto-increment `record_number` key followed by the
//! columns of its [`TableSchema`]. Imports add rows as text; dictionary
//! enforcement later rebuilds the table with typed columns.

use super::header::RECORD_NUMBER;
use super::limits::check_schema;
use super::schema::{ColumnType, IndexSpec, TableSchema};
use super::Database;
use dkan_common::{DkanError, Result};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

/// SQLite's bound parameter limit per statement
const MAX_BIND_PARAMS: usize = 999;

/// Quote an identifier for SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A typed cell written during a table rebuild
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
}

/// One stored row: its record number and every column as text
pub type TextRow = (i64, Vec<Option<String>>);

#[derive(Debug, Clone)]
pub struct DatabaseTable {
    db: Database,
    name: String,
}

impl DatabaseTable {
    pub fn new(db: Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn exists(&self) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.name)
                .fetch_one(self.db.pool())
                .await?;
        Ok(count > 0)
    }

    fn create_sql(name: &str, schema: &TableSchema) -> String {
        let mut defs = vec![format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(RECORD_NUMBER)
        )];
        for column in &schema.columns {
            let null = if column.nullable { "" } else { " NOT NULL" };
            defs.push(format!(
                "{} {}{}",
                quote_ident(&column.name),
                column.column_type.sql(),
                null
            ));
        }
        format!("CREATE TABLE {} ({})", quote_ident(name), defs.join(", "))
    }

    fn index_sql(table: &str, index: &IndexSpec) -> String {
        let fields: Vec<String> = index.fields.iter().map(|f| quote_ident(f)).collect();
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{table}__{}", index.name)),
            quote_ident(table),
            fields.join(", ")
        )
    }

    /// Create the table; limits are checked under the active connection's
    /// strictness
    pub async fn create(&self, schema: &TableSchema) -> Result<()> {
        check_schema(&self.name, schema, self.db.settings().strict_mode)?;

        let mut tx = self.db.pool().begin().await?;
        sqlx::query(&Self::create_sql(&self.name, schema))
            .execute(&mut *tx)
            .await?;
        for index in &schema.indexes {
            sqlx::query(&Self::index_sql(&self.name, index))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(table = %self.name, columns = schema.columns.len(), "Created table");
        Ok(())
    }

    /// Current columns as declared, without `record_number`
    pub async fn schema(&self) -> Result<TableSchema> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(&self.name)))
            .fetch_all(self.db.pool())
            .await?;
        if rows.is_empty() {
            return Err(DkanError::not_found(format!("table {}", self.name)));
        }

        let mut schema = TableSchema::default();
        for row in rows {
            let name: String = row.try_get("name")?;
            if name == RECORD_NUMBER {
                continue;
            }
            let declared: String = row.try_get("type")?;
            let not_null: i64 = row.try_get("notnull")?;
            schema.columns.push(super::ColumnSpec {
                name,
                column_type: ColumnType::parse(&declared)?,
                nullable: not_null == 0,
                description: None,
            });
        }
        Ok(schema)
    }

    /// Names of the indexes created from [`IndexSpec`]s
    pub async fn index_names(&self) -> Result<Vec<String>> {
        let prefix = format!("{}__", self.name);
        let rows = sqlx::query(&format!("PRAGMA index_list({})", quote_ident(&self.name)))
            .fetch_all(self.db.pool())
            .await?;
        let mut names = Vec::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            if let Some(short) = name.strip_prefix(&prefix) {
                names.push(short.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Insert text rows in one transaction, numbering them from
    /// `first_record`; returns the number inserted
    pub async fn insert_rows(&self, columns: &[String], rows: &[Vec<String>], first_record: u64) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(DkanError::import(format!(
                "row has {} values, table has {} columns",
                bad.len(),
                columns.len()
            )));
        }

        let mut column_list = vec![quote_ident(RECORD_NUMBER)];
        column_list.extend(columns.iter().map(|c| quote_ident(c)));
        let per_statement = (MAX_BIND_PARAMS / column_list.len()).max(1);

        let mut record = first_record as i64;
        let mut tx = self.db.pool().begin().await?;
        for chunk in rows.chunks(per_statement) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                quote_ident(&self.name),
                column_list.join(", ")
            ));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(record);
                record += 1;
                for value in row {
                    b.push_bind(value.as_str());
                }
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(table = %self.name, first_record, rows = rows.len(), "Inserted rows");
        Ok(rows.len() as u64)
    }

    /// Delete every row numbered above `record_number`; returns how many
    pub async fn delete_after(&self, record_number: u64) -> Result<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} > ?",
            quote_ident(&self.name),
            quote_ident(RECORD_NUMBER)
        ))
        .bind(record_number as i64)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(&self.name)))
            .fetch_one(self.db.pool())
            .await?;
        Ok(count as u64)
    }

    pub async fn drop_table(&self) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(&self.name)))
            .execute(self.db.pool())
            .await?;
        info!(table = %self.name, "Dropped table");
        Ok(())
    }

    /// Values of one column as text, in record order
    pub async fn column_values(&self, column: &str) -> Result<Vec<Option<String>>> {
        let rows = sqlx::query(&format!(
            "SELECT CAST({col} AS TEXT) AS v FROM {table} ORDER BY {key}",
            col = quote_ident(column),
            table = quote_ident(&self.name),
            key = quote_ident(RECORD_NUMBER)
        ))
        .fetch_all(self.db.pool())
        .await?;
        rows.iter()
            .map(|r| r.try_get::<Option<String>, _>("v").map_err(DkanError::from))
            .collect()
    }

    /// Every row with the given columns as text
    pub async fn text_rows(&self, columns: &[String]) -> Result<Vec<TextRow>> {
        let mut select = vec![quote_ident(RECORD_NUMBER)];
        select.extend(columns.iter().map(|c| format!("CAST({} AS TEXT)", quote_ident(c))));
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            select.join(", "),
            quote_ident(&self.name),
            quote_ident(RECORD_NUMBER)
        ))
        .fetch_all(self.db.pool())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: i64 = row.try_get(0)?;
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(row.try_get::<Option<String>, _>(i + 1)?);
            }
            out.push((record, values));
        }
        Ok(out)
    }

    /// Replace the table with one of `schema` holding `rows`
    ///
    /// Rows carry their record number and one value per schema column. The
    /// swap happens in a single transaction.
    pub async fn rebuild(&self, schema: &TableSchema, rows: Vec<(i64, Vec<CellValue>)>) -> Result<()> {
        check_schema(&self.name, schema, self.db.settings().strict_mode)?;

        let staging = format!("{}__rebuild", self.name);
        let mut columns = vec![quote_ident(RECORD_NUMBER)];
        columns.extend(schema.columns.iter().map(|c| quote_ident(&c.name)));
        let per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);

        let mut tx = self.db.pool().begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(&staging)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&Self::create_sql(&staging, schema))
            .execute(&mut *tx)
            .await?;

        for chunk in rows.chunks(per_statement) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                quote_ident(&staging),
                columns.join(", ")
            ));
            qb.push_values(chunk, |mut b, (record, values)| {
                b.push_bind(*record);
                for value in values {
                    match value {
                        CellValue::Null => b.push_bind(None::<String>),
                        CellValue::Text(s) => b.push_bind(s.clone()),
                        CellValue::Integer(i) => b.push_bind(*i),
                        CellValue::Real(f) => b.push_bind(*f),
                    };
                }
            });
            qb.build().execute(&mut *tx).await?;
        }

        sqlx::query(&format!("DROP TABLE {}", quote_ident(&self.name)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&staging),
            quote_ident(&self.name)
        ))
        .execute(&mut *tx)
        .await?;
        for index in &schema.indexes {
            sqlx::query(&Self::index_sql(&self.name, index))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(table = %self.name, columns = schema.columns.len(), "Rebuilt table");
        Ok(())
    }
}
