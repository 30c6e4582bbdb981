//! Catalog introspection contracts.
//!
//! The crawler never issues dialect-specific queries itself; everything it
//! learns about a catalog comes through these two traits. A
//! [`CatalogInspector`] enumerates databases and opens a scoped
//! [`DatabaseInspector`] session per database. Session methods beyond the
//! required listing and column calls have defaults that return
//! [`CrawlError::NotSupported`], which the crawler treats as "no data,
//! continue".
//!
//! # Object Safety
//! Both traits are object-safe and are used as `&dyn CatalogInspector` and
//! `Box<dyn DatabaseInspector>`.

use crate::{
    Result,
    error::CrawlError,
    models::{
        ColumnDescriptor, ForeignKeyRef, PartitionSpec, PrimaryKey, TableComment, TableStorage,
    },
    profiling::ProfileThresholds,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Entry point of a dialect adapter.
#[async_trait]
pub trait CatalogInspector: Send + Sync {
    /// Platform name used in identifiers and error messages.
    fn platform(&self) -> &str;

    /// Lists the database scopes this catalog exposes.
    ///
    /// A dialect may expose exactly one.
    ///
    /// # Errors
    /// Any error here is fatal to the run.
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Opens an introspection session scoped to one database.
    ///
    /// The crawler holds the session for the whole database walk and calls
    /// [`DatabaseInspector::close`] on every exit path.
    ///
    /// # Errors
    /// Returns [`CrawlError::Connection`] if no session can be established.
    async fn connect(&self, database: &str) -> Result<Box<dyn DatabaseInspector>>;
}

/// Introspection session for one database.
#[async_trait]
pub trait DatabaseInspector: Send + Sync {
    /// Platform name used in NotSupported signals.
    fn platform(&self) -> &str;

    /// Lists schema names in this database.
    async fn list_schemas(&self) -> Result<Vec<String>>;

    /// Lists table names in a schema.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Lists view names in a schema.
    async fn list_views(&self, schema: &str) -> Result<Vec<String>>;

    /// Returns the columns of a table or view.
    async fn get_columns(&self, entity: &str, schema: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Returns every column row in a schema, in whatever order the backend
    /// produces them. Callers group with [`group_columns_by_table`].
    async fn list_schema_columns(&self, _schema: &str) -> Result<Vec<ColumnRow>> {
        Err(CrawlError::not_supported(
            "list_schema_columns",
            self.platform(),
        ))
    }

    /// Returns the table comment and free-form properties.
    async fn get_table_comment(&self, _entity: &str, _schema: &str) -> Result<TableComment> {
        Err(CrawlError::not_supported("get_table_comment", self.platform()))
    }

    /// Returns the primary key, if the table has one.
    async fn get_primary_key(&self, _table: &str, _schema: &str) -> Result<Option<PrimaryKey>> {
        Err(CrawlError::not_supported("get_primary_key", self.platform()))
    }

    /// Returns foreign keys declared on a table.
    async fn get_foreign_keys(&self, _table: &str, _schema: &str) -> Result<Vec<ForeignKeyRef>> {
        Err(CrawlError::not_supported("get_foreign_keys", self.platform()))
    }

    /// Returns the raw view definition text.
    async fn get_view_definition(&self, _view: &str, _schema: &str) -> Result<Option<String>> {
        Err(CrawlError::not_supported(
            "get_view_definition",
            self.platform(),
        ))
    }

    /// Returns storage location and creation time of a table.
    async fn get_table_storage(&self, _table: &str, _schema: &str) -> Result<TableStorage> {
        Err(CrawlError::not_supported("get_table_storage", self.platform()))
    }

    /// Returns tags keyed by column name.
    async fn get_column_tags(
        &self,
        _entity: &str,
        _schema: &str,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        Err(CrawlError::not_supported("get_column_tags", self.platform()))
    }

    /// Returns names of tables in a schema that satisfy the profiling
    /// thresholds.
    async fn profile_candidates(
        &self,
        _schema: &str,
        _thresholds: &ProfileThresholds,
    ) -> Result<Vec<String>> {
        Err(CrawlError::not_supported(
            "profile_candidates",
            self.platform(),
        ))
    }

    /// Returns true when the table is partitioned.
    async fn is_table_partitioned(&self, _table: &str, _schema: &str) -> Result<bool> {
        Ok(false)
    }

    /// Picks the partition to profile for a partitioned table.
    ///
    /// `None` means no usable partition was found.
    async fn partition_profile_query(
        &self,
        _table: &str,
        _schema: &str,
        _partition_datetime: Option<DateTime<Utc>>,
    ) -> Result<Option<PartitionSpec>> {
        Ok(None)
    }

    /// Releases the session.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Identifies the table a column row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub schema: String,
    pub table: String,
}

impl TableKey {
    /// Creates a new table key.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// One ungrouped column row from a bulk column query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub column: ColumnDescriptor,
}

/// Columns of each table, keyed by table.
pub type ColumnDescriptorMap = BTreeMap<TableKey, Vec<ColumnDescriptor>>;

/// Groups ungrouped column rows by table using keyed accumulation.
///
/// Input order does not matter: rows for one table may be interleaved with
/// rows for others. Each table's columns come back sorted by ordinal, then
/// by name.
///
/// # Example
/// ```rust
/// use dbcrawl_core::inspector::{ColumnRow, TableKey, group_columns_by_table};
/// use dbcrawl_core::models::ColumnDescriptor;
///
/// let row = |table: &str, name: &str, ordinal| ColumnRow {
///     schema: "s1".to_string(),
///     table: table.to_string(),
///     column: ColumnDescriptor::new(name, "int", ordinal),
/// };
/// let grouped = group_columns_by_table(vec![row("b", "y", 1), row("a", "x", 0), row("b", "x", 0)]);
///
/// assert_eq!(grouped[&TableKey::new("s1", "b")].len(), 2);
/// assert_eq!(grouped[&TableKey::new("s1", "b")][0].name, "x");
/// ```
pub fn group_columns_by_table(rows: impl IntoIterator<Item = ColumnRow>) -> ColumnDescriptorMap {
    let mut grouped = ColumnDescriptorMap::new();

    for row in rows {
        grouped
            .entry(TableKey::new(row.schema, row.table))
            .or_default()
            .push(row.column);
    }

    for columns in grouped.values_mut() {
        columns.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(table: &str, name: &str, ordinal: u32) -> ColumnRow {
        ColumnRow {
            schema: "s1".to_string(),
            table: table.to_string(),
            column: ColumnDescriptor::new(name, "integer", ordinal),
        }
    }

    #[test]
    fn test_grouping_handles_interleaved_rows() {
        let rows = vec![
            row("foo", "b", 1),
            row("bar", "x", 0),
            row("foo", "a", 0),
            row("bar", "y", 1),
            row("foo", "c", 2),
        ];

        let grouped = group_columns_by_table(rows);
        assert_eq!(grouped.len(), 2);

        let foo: Vec<_> = grouped[&TableKey::new("s1", "foo")]
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(foo, vec!["a", "b", "c"]);

        let bar: Vec<_> = grouped[&TableKey::new("s1", "bar")]
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(bar, vec!["x", "y"]);
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let rows = vec![row("foo", "a", 0), row("bar", "x", 0), row("foo", "b", 1)];
        let mut reversed = rows.clone();
        reversed.reverse();

        assert_eq!(group_columns_by_table(rows), group_columns_by_table(reversed));
    }

    #[test]
    fn test_grouping_separates_schemas() {
        let mut other = row("foo", "a", 0);
        other.schema = "s2".to_string();

        let grouped = group_columns_by_table(vec![row("foo", "a", 0), other]);
        assert_eq!(grouped.len(), 2);
        assert!(grouped.contains_key(&TableKey::new("s2", "foo")));
    }
}
