//! Catalog crawl, normalization and stale-entity engine for dbcrawl.
//!
//! This crate walks a relational catalog (databases, schemas, tables, views,
//! columns) through a dialect-supplied [`CatalogInspector`], turns what it
//! finds into normalized entities, and tracks which entities disappeared
//! between runs so they can be marked removed.
//!
//! # Guarantees
//! - Catalog introspection is read-only
//! - Identifiers are deterministic: the same catalog state yields the same
//!   identifiers whatever order introspection returns rows in
//! - A failure on one table, view or schema never stops the rest of the crawl
//! - Removals are only inferred from complete runs
//! - Connection strings are redacted before they reach logs or errors
//!
//! # Architecture
//! - [`crawler::Crawler`] drives the walk and owns the per-run state
//! - [`inspector`], [`dialect`], [`sink`], [`state`] and [`profiling`]
//!   define the seams to dialects, consumers and persistence
//! - [`filter`] and [`type_mapping`] are pure, per-instance helpers
//! - [`adapters`] holds feature-gated dialect adapters

pub mod adapters;
pub mod config;
pub mod crawler;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod inspector;
pub mod logging;
pub mod models;
pub mod profiling;
pub mod report;
pub mod sink;
pub mod stale;
pub mod state;
pub mod type_mapping;

// Re-export commonly used types
pub use config::{CrawlConfig, ProfilingConfig, StatefulIngestionConfig};
pub use crawler::{CrawlContext, CrawlState, Crawler};
pub use dialect::{Dialect, StandardDialect};
pub use error::{CrawlError, Result};
pub use filter::{FilterPattern, PatternFilter};
pub use inspector::{CatalogInspector, DatabaseInspector};
pub use models::{
    CanonicalField, ColumnDescriptor, ContainerEntity, ContainerSubtype, DatasetEntity,
    DatasetIdentifier, DatasetKind, TypeCategory, WorkUnit,
};
pub use report::CrawlReport;
pub use sink::{EntitySink, JsonLinesSink, MemorySink};
pub use state::{CheckpointState, CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore};
pub use type_mapping::{TypeMapper, TypeMatcher};
