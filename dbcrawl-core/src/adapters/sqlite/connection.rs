//! SQLite connection handling.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/catalog.db` or a bare `.db`/`.sqlite`/`.sqlite3` path
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! File databases are opened read-only; crawling never writes.

use super::SqliteCatalog;
use crate::{Result, error::CrawlError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

impl SqliteCatalog {
    /// Opens a SQLite catalog from a connection string.
    ///
    /// # Errors
    /// Returns a configuration error for malformed connection strings and a
    /// connection error if the database cannot be opened.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        validate_connection_string(connection_string)?;

        let normalized = normalize_connection_string(connection_string);
        let in_memory = is_in_memory(connection_string);

        let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
            CrawlError::configuration(format!("Invalid SQLite connection string: {}", e))
        })?;
        if !in_memory {
            options = options.read_only(true);
        }

        // In-memory databases exist per connection, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| CrawlError::connection_failed("Failed to open SQLite database", e))?;

        let database_name = database_name(connection_string);
        tracing::debug!("Opened SQLite catalog '{}'", database_name);

        Ok(Self::from_pool(pool, database_name))
    }
}

fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Validates SQLite connection string format.
///
/// # Errors
/// Returns error if the string is neither a sqlite URL, a database file
/// path, nor `:memory:`
pub fn validate_connection_string(connection_string: &str) -> Result<()> {
    if connection_string == ":memory:" {
        return Ok(());
    }

    if connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        return Ok(());
    }

    if connection_string.starts_with("sqlite:") {
        if is_in_memory(connection_string) {
            return Ok(());
        }
        if let Ok(url) = url::Url::parse(connection_string) {
            if url.scheme() != "sqlite" {
                return Err(CrawlError::configuration(
                    "Connection string must use sqlite:// scheme",
                ));
            }
            return Ok(());
        }
        if connection_string.starts_with("sqlite://") {
            return Ok(());
        }
    }

    Err(CrawlError::configuration(
        "Invalid SQLite connection string format: expected sqlite:// URL, file path, or :memory:",
    ))
}

/// Database name used in identifiers: the file stem, or `main` in memory.
pub fn database_name(connection_string: &str) -> String {
    if is_in_memory(connection_string) {
        return "main".to_string();
    }

    let path = connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))
        .unwrap_or(connection_string);
    let path = path.split('?').next().unwrap_or(path);

    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map_or_else(|| "main".to_string(), str::to_string)
}

fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }
    format!("sqlite://{}", connection_string)
}
