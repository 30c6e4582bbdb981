//! SQLite reference adapter.
//!
//! # Module Structure
//! - `connection`: Connection string handling and pool creation
//! - `introspection`: [`DatabaseInspector`] over `sqlite_master` and the
//!   `pragma_*` table-valued functions
//! - `profiler`: Row, null and distinct counts per table
//!
//! # Catalog Shape
//! A SQLite file is exposed as one database named after the file stem
//! (`main` for in-memory databases). Its schemas are the entries of
//! `PRAGMA database_list` except `temp`, so attached databases appear as
//! sibling schemas of `main`.

pub mod connection;
pub mod introspection;
pub mod profiler;

use crate::{
    Result,
    error::CrawlError,
    inspector::{CatalogInspector, DatabaseInspector},
};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub use introspection::SqliteSession;
pub use profiler::SqliteProfiler;

/// Platform name used in identifiers.
pub const PLATFORM: &str = "sqlite";

/// SQLite catalog inspector.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    database_name: String,
}

impl std::fmt::Debug for SqliteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalog")
            .field("database_name", &self.database_name)
            .finish_non_exhaustive()
    }
}

impl SqliteCatalog {
    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool, database_name: impl Into<String>) -> Self {
        Self {
            pool,
            database_name: database_name.into(),
        }
    }

    /// Name the file is exposed under.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Profiler sharing this catalog's pool.
    pub fn profiler(&self) -> SqliteProfiler {
        SqliteProfiler::new(self.pool.clone())
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CatalogInspector for SqliteCatalog {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(vec![self.database_name.clone()])
    }

    async fn connect(&self, database: &str) -> Result<Box<dyn DatabaseInspector>> {
        if database != self.database_name {
            return Err(CrawlError::configuration(format!(
                "Unknown SQLite database '{}'",
                database
            )));
        }

        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::connection_failed("SQLite connectivity check failed", e))?;

        Ok(Box::new(SqliteSession::new(self.pool.clone())))
    }
}
