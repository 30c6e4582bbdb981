//! Dialect adapters and the adapter factory.
//!
//! Each adapter implements [`CatalogInspector`] for one catalog platform and
//! may ship a [`Profiler`]. Adapters are feature-gated so minimal builds do
//! not pull in database drivers.

use crate::{Result, error::CrawlError, inspector::CatalogInspector, profiling::Profiler};

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Inspector and optional profiler for one catalog.
pub struct DialectAdapter {
    /// Catalog introspection entry point
    pub inspector: Box<dyn CatalogInspector>,
    /// Profiler, when the dialect supports one
    pub profiler: Option<Box<dyn Profiler>>,
}

impl std::fmt::Debug for DialectAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectAdapter")
            .field("platform", &self.inspector.platform())
            .field("has_profiler", &self.profiler.is_some())
            .finish()
    }
}

/// Platforms the factory knows how to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Sqlite,
}

/// Detects the platform from a connection string.
///
/// # Errors
/// Returns a configuration error for unrecognized connection strings.
/// The connection string is redacted in the message.
pub fn detect_platform(connection_string: &str) -> Result<Platform> {
    let lower = connection_string.to_lowercase();
    if lower.starts_with("sqlite:")
        || lower == ":memory:"
        || lower.ends_with(".db")
        || lower.ends_with(".sqlite")
        || lower.ends_with(".sqlite3")
    {
        return Ok(Platform::Sqlite);
    }

    Err(CrawlError::configuration(format!(
        "Unsupported catalog connection string: {}",
        crate::error::redact_database_url(connection_string)
    )))
}

/// Creates the adapter for a connection string.
///
/// # Errors
/// Returns error if the platform is unknown, its feature is not compiled
/// in, or the catalog cannot be opened.
pub async fn create_adapter(connection_string: &str) -> Result<DialectAdapter> {
    match detect_platform(connection_string)? {
        #[cfg(feature = "sqlite")]
        Platform::Sqlite => {
            let catalog = sqlite::SqliteCatalog::connect(connection_string).await?;
            let profiler = catalog.profiler();
            Ok(DialectAdapter {
                inspector: Box::new(catalog),
                profiler: Some(Box::new(profiler)),
            })
        }
        #[cfg(not(feature = "sqlite"))]
        Platform::Sqlite => Err(CrawlError::configuration(
            "SQLite adapter not available: compile with --features sqlite",
        )),
    }
}
