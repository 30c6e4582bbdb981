//! SQLite catalog introspection.
//!
//! Uses the `pragma_table_info`, `pragma_foreign_key_list` and
//! `pragma_database_list` table-valued functions so table and schema names
//! are bound as parameters. Only `sqlite_master` needs a schema-qualified
//! name, which is quoted with [`quote_identifier`].

use super::PLATFORM;
use crate::{
    Result,
    error::CrawlError,
    inspector::{ColumnRow, DatabaseInspector},
    models::{ColumnDescriptor, ForeignKeyRef, PrimaryKey},
    profiling::ProfileThresholds,
};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::collections::BTreeMap;

/// Introspection session over a SQLite pool.
pub struct SqliteSession {
    pool: SqlitePool,
}

impl SqliteSession {
    /// Wraps an open pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn list_master(&self, schema: &str, object_type: &str) -> Result<Vec<String>> {
        let query = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            quote_identifier(schema)
        );

        sqlx::query_scalar::<_, String>(&query)
            .bind(object_type)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                CrawlError::introspection_failed(
                    format!("Failed to list {}s in schema '{}'", object_type, schema),
                    e,
                )
            })
    }
}

/// Quotes an identifier for interpolation into SQL text.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_from_row(row: &SqliteRow) -> Result<ColumnDescriptor> {
    let name: String = row
        .try_get("name")
        .map_err(|e| CrawlError::introspection_failed("Failed to parse column name", e))?;
    let cid: i64 = row.try_get("cid").unwrap_or(0);
    let data_type: String = row.try_get("type").unwrap_or_default();
    let notnull: i64 = row.try_get("notnull").unwrap_or(0);
    let pk: i64 = row.try_get("pk").unwrap_or(0);

    // PRIMARY KEY columns are implicitly NOT NULL even when PRAGMA says otherwise
    Ok(ColumnDescriptor::new(name, data_type, u32::try_from(cid).unwrap_or_default())
        .with_nullable(notnull == 0 && pk == 0))
}

#[async_trait]
impl DatabaseInspector for SqliteSession {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn list_schemas(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_database_list WHERE name != 'temp' ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::introspection_failed("Failed to list schemas", e))
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        self.list_master(schema, "table").await
    }

    async fn list_views(&self, schema: &str) -> Result<Vec<String>> {
        self.list_master(schema, "view").await
    }

    async fn get_columns(&self, entity: &str, schema: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(
            r#"SELECT cid, name, type, "notnull", pk FROM pragma_table_info(?1, ?2) ORDER BY cid"#,
        )
        .bind(entity)
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CrawlError::introspection_failed(
                format!("Failed to collect columns for '{}.{}'", schema, entity),
                e,
            )
        })?;

        rows.iter().map(column_from_row).collect()
    }

    async fn list_schema_columns(&self, schema: &str) -> Result<Vec<ColumnRow>> {
        let query = format!(
            r#"SELECT m.name AS table_name, p.cid, p.name, p.type, p."notnull", p.pk
               FROM {}.sqlite_master AS m, pragma_table_info(m.name, ?1) AS p
               WHERE m.type IN ('table', 'view') AND m.name NOT LIKE 'sqlite_%'"#,
            quote_identifier(schema)
        );

        let rows = sqlx::query(&query)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                CrawlError::introspection_failed(
                    format!("Failed to list columns in schema '{}'", schema),
                    e,
                )
            })?;

        rows.iter()
            .map(|row| {
                let table: String = row.try_get("table_name").map_err(|e| {
                    CrawlError::introspection_failed("Failed to parse table name", e)
                })?;
                Ok(ColumnRow {
                    schema: schema.to_string(),
                    table,
                    column: column_from_row(row)?,
                })
            })
            .collect()
    }

    async fn get_primary_key(&self, table: &str, schema: &str) -> Result<Option<PrimaryKey>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
        )
        .bind(table)
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CrawlError::introspection_failed(
                format!("Failed to collect primary key for '{}.{}'", schema, table),
                e,
            )
        })?;

        // SQLite doesn't name primary key constraints
        Ok((!columns.is_empty()).then_some(PrimaryKey {
            name: None,
            columns,
        }))
    }

    async fn get_foreign_keys(&self, table: &str, schema: &str) -> Result<Vec<ForeignKeyRef>> {
        let rows = sqlx::query(
            r#"SELECT id, seq, "table", "from", "to" FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq"#,
        )
        .bind(table)
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CrawlError::introspection_failed(
                format!("Failed to collect foreign keys for '{}.{}'", schema, table),
                e,
            )
        })?;

        // Composite foreign keys share an id
        let mut grouped: BTreeMap<i64, ForeignKeyRef> = BTreeMap::new();
        for row in &rows {
            let id: i64 = row.try_get("id").unwrap_or(0);
            let referred_table: String = row.try_get("table").unwrap_or_default();
            let from: String = row.try_get("from").unwrap_or_default();
            // "to" is NULL when the reference targets the parent's primary key
            let to: Option<String> = row.try_get("to").unwrap_or(None);

            let fk = grouped.entry(id).or_insert_with(|| ForeignKeyRef {
                name: None,
                constrained_columns: Vec::new(),
                referred_schema: Some(schema.to_string()),
                referred_table,
                referred_columns: Vec::new(),
            });
            fk.constrained_columns.push(from);
            if let Some(to) = to {
                fk.referred_columns.push(to);
            }
        }

        Ok(grouped.into_values().collect())
    }

    async fn get_view_definition(&self, view: &str, schema: &str) -> Result<Option<String>> {
        let query = format!(
            "SELECT sql FROM {}.sqlite_master WHERE type = 'view' AND name = ?1",
            quote_identifier(schema)
        );

        let definition = sqlx::query_scalar::<_, Option<String>>(&query)
            .bind(view)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                CrawlError::introspection_failed(
                    format!("Failed to read definition of view '{}.{}'", schema, view),
                    e,
                )
            })?;

        Ok(definition.flatten())
    }

    async fn profile_candidates(
        &self,
        schema: &str,
        thresholds: &ProfileThresholds,
    ) -> Result<Vec<String>> {
        // Only row counts are cheap to obtain; size and age need dbstat or file metadata
        let Some(row_limit) = thresholds.row_limit else {
            return Err(CrawlError::not_supported(
                "profile_candidates without row_limit",
                PLATFORM,
            ));
        };

        let mut candidates = Vec::new();
        for table in self.list_tables(schema).await? {
            let query = format!(
                "SELECT COUNT(*) FROM {}.{}",
                quote_identifier(schema),
                quote_identifier(&table)
            );
            let count: i64 = sqlx::query_scalar(&query)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    CrawlError::introspection_failed(
                        format!("Failed to count rows of '{}.{}'", schema, table),
                        e,
                    )
                })?;

            if u64::try_from(count).is_ok_and(|count| count <= row_limit) {
                candidates.push(table);
            }
        }

        Ok(candidates)
    }
}
