//! SQLite dataset profiler.

use super::introspection::quote_identifier;
use crate::{
    Result,
    error::CrawlError,
    models::{DatasetProfile, FieldProfile, ProfileRequest},
    profiling::Profiler,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Computes row count plus per-column null and distinct counts.
#[derive(Clone)]
pub struct SqliteProfiler {
    pool: SqlitePool,
}

impl SqliteProfiler {
    /// Wraps an open pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_count(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

#[async_trait]
impl Profiler for SqliteProfiler {
    async fn profile(&self, request: &ProfileRequest) -> Result<DatasetProfile> {
        let source = match &request.custom_query {
            Some(query) => format!("({})", query),
            None => format!(
                "{}.{}",
                quote_identifier(&request.schema),
                quote_identifier(&request.table)
            ),
        };
        let name = request.dataset.qualified_name();

        let columns = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid",
        )
        .bind(&request.table)
        .bind(&request.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CrawlError::introspection_failed(format!("Failed to list columns of {}", name), e)
        })?;

        let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", source))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                CrawlError::introspection_failed(format!("Failed to count rows of {}", name), e)
            })?;

        let mut field_profiles = Vec::with_capacity(columns.len());
        for column in &columns {
            let quoted = quote_identifier(column);
            let query = format!(
                "SELECT COUNT(*) - COUNT({col}) AS nulls, COUNT(DISTINCT {col}) AS distinct_values FROM {source}",
                col = quoted,
                source = source
            );
            let row = sqlx::query(&query)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    CrawlError::introspection_failed(
                        format!("Failed to profile column {}.{}", name, column),
                        e,
                    )
                })?;

            let nulls: i64 = row.try_get("nulls").unwrap_or(0);
            let distinct: i64 = row.try_get("distinct_values").unwrap_or(0);
            field_profiles.push(FieldProfile {
                path: column.clone(),
                null_count: to_count(nulls),
                distinct_count: to_count(distinct),
            });
        }

        tracing::debug!("Profiled {}: {} rows", name, row_count);

        Ok(DatasetProfile {
            dataset: request.dataset.urn(),
            row_count: to_count(row_count),
            column_count: columns.len(),
            partition_spec: request.partition_spec.clone(),
            field_profiles,
            profiled_at: Utc::now(),
        })
    }
}
