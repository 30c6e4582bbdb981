//! Core data models for catalog crawl output.
//!
//! These are the normalized, dialect-independent records produced by a crawl.
//! Entities are built fresh on every run and never mutated after emission; a
//! re-crawl of an unchanged catalog produces equal values with equal
//! identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical type taxonomy every native column type is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    Number,
    String,
    Boolean,
    Date,
    Time,
    Bytes,
    Array,
    Record,
    Enum,
    Unknown,
}

impl std::fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TypeCategory::Number => "Number",
            TypeCategory::String => "String",
            TypeCategory::Boolean => "Boolean",
            TypeCategory::Date => "Date",
            TypeCategory::Time => "Time",
            TypeCategory::Bytes => "Bytes",
            TypeCategory::Array => "Array",
            TypeCategory::Record => "Record",
            TypeCategory::Enum => "Enum",
            TypeCategory::Unknown => "Unknown",
        };
        write!(f, "{}", label)
    }
}

/// Case policy applied to every identifier part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentifierCase {
    /// Keep names exactly as the catalog reports them
    #[default]
    Preserve,
    /// Lower-case every part
    Lower,
    /// Upper-case every part
    Upper,
}

impl IdentifierCase {
    /// Applies the policy to one identifier part.
    pub fn apply(self, part: &str) -> String {
        match self {
            IdentifierCase::Preserve => part.to_string(),
            IdentifierCase::Lower => part.to_lowercase(),
            IdentifierCase::Upper => part.to_uppercase(),
        }
    }
}

/// Stable identifier of a dataset (table or view).
///
/// Two identifiers built from the same catalog state are equal and render
/// to the same [`urn`](Self::urn), whatever order introspection returned
/// rows in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetIdentifier {
    pub platform: String,
    pub platform_instance: Option<String>,
    pub environment: String,
    /// Container names from the top: database, then schema
    pub schema_path: Vec<String>,
    pub name: String,
}

impl DatasetIdentifier {
    /// Creates an identifier from already-normalized parts.
    pub fn new(
        platform: impl Into<String>,
        platform_instance: Option<String>,
        environment: impl Into<String>,
        schema_path: Vec<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            platform_instance,
            environment: environment.into(),
            schema_path,
            name: name.into(),
        }
    }

    /// Dot-joined container path plus dataset name, e.g. `db.s1.foo`.
    pub fn qualified_name(&self) -> String {
        let mut parts = self.schema_path.clone();
        parts.push(self.name.clone());
        parts.join(".")
    }

    /// Globally unique identifier string used for checkpoints and removals.
    pub fn urn(&self) -> String {
        let instance = self
            .platform_instance
            .as_ref()
            .map_or_else(String::new, |i| format!("{}.", i));
        format!(
            "urn:li:dataset:(urn:li:dataPlatform:{},{}{},{})",
            self.platform,
            instance,
            self.qualified_name(),
            self.environment
        )
    }

    /// Fully qualified reference to one field of this dataset.
    pub fn field_urn(&self, field_path: &str) -> String {
        format!("urn:li:schemaField:({},{})", self.urn(), field_path)
    }
}

impl std::fmt::Display for DatasetIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// Subtype tag carried by container entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerSubtype {
    Database,
    Catalog,
    Schema,
}

impl std::fmt::Display for ContainerSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerSubtype::Database => write!(f, "Database"),
            ContainerSubtype::Catalog => write!(f, "Catalog"),
            ContainerSubtype::Schema => write!(f, "Schema"),
        }
    }
}

/// Stable identifier of a container node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerKey {
    pub platform: String,
    pub platform_instance: Option<String>,
    pub environment: String,
    /// Names from the top-level container down to this node
    pub path: Vec<String>,
}

impl ContainerKey {
    /// Key for a child container one level below this one.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self {
            path,
            ..self.clone()
        }
    }

    /// Globally unique identifier string used for checkpoints and removals.
    pub fn urn(&self) -> String {
        let instance = self
            .platform_instance
            .as_ref()
            .map_or_else(String::new, |i| format!("{}.", i));
        format!(
            "urn:li:container:({},{}{},{})",
            self.platform,
            instance,
            self.path.join("."),
            self.environment
        )
    }
}

/// Database, catalog or schema node of the container tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEntity {
    pub key: ContainerKey,
    pub name: String,
    pub subtype: ContainerSubtype,
    pub parent: Option<ContainerKey>,
    pub properties: BTreeMap<String, String>,
}

/// One column as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub native_type: String,
    pub nullable: bool,
    /// Display order within the table
    pub ordinal: u32,
    pub comment: Option<String>,
    pub is_partition_key: bool,
}

impl ColumnDescriptor {
    /// Creates a nullable, non-partition column.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            nullable: true,
            ordinal,
            comment: None,
            is_partition_key: false,
        }
    }

    /// Builder method to set nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Builder method to set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder method to mark the column as a partition key.
    pub fn with_partition_key(mut self, is_partition_key: bool) -> Self {
        self.is_partition_key = is_partition_key;
        self
    }
}

/// Normalized column in a dataset's canonical schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub path: String,
    pub type_category: TypeCategory,
    pub native_type_label: String,
    pub nullable: bool,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_key_column: bool,
}

/// Primary key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Foreign key as reported by introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub name: Option<String>,
    pub constrained_columns: Vec<String>,
    pub referred_schema: Option<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

/// Foreign key resolved against dataset identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub name: Option<String>,
    pub foreign_dataset: String,
    pub source_fields: Vec<String>,
    pub foreign_fields: Vec<String>,
}

/// Table comment and free-form properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableComment {
    pub text: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Physical storage details of a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStorage {
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Variant-specific part of a dataset entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatasetKind {
    Table {
        create_date: Option<DateTime<Utc>>,
        storage_location: Option<String>,
        partition_column_names: Vec<String>,
    },
    View {
        /// Definition text exactly as the catalog returned it
        view_definition_text: Option<String>,
        is_materialized: bool,
    },
}

/// A table or view with its canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntity {
    pub identifier: DatasetIdentifier,
    /// Schema container this dataset belongs to
    pub container: ContainerKey,
    pub description: Option<String>,
    pub fields: Vec<CanonicalField>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    pub properties: BTreeMap<String, String>,
    pub kind: DatasetKind,
}

impl DatasetEntity {
    /// Returns true for the view variant.
    pub fn is_view(&self) -> bool {
        matches!(self.kind, DatasetKind::View { .. })
    }

    /// Looks up a field by path.
    pub fn field(&self, path: &str) -> Option<&CanonicalField> {
        self.fields.iter().find(|f| f.path == path)
    }
}

/// Copy-lineage edge from a table to its storage location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamLineage {
    pub dataset: String,
    pub upstream_location: String,
}

/// Partition selection returned by a dialect for profiling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub partition: Option<String>,
    pub custom_query: Option<String>,
}

/// A dataset selected for deeper profiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub dataset: DatasetIdentifier,
    /// Native schema name, as the catalog knows it
    pub schema: String,
    /// Native table name, as the catalog knows it
    pub table: String,
    pub partition_spec: Option<String>,
    pub custom_query: Option<String>,
}

/// Per-column profiling statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProfile {
    pub path: String,
    pub null_count: Option<u64>,
    pub distinct_count: Option<u64>,
}

/// Result of profiling one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub dataset: String,
    pub row_count: Option<u64>,
    pub column_count: usize,
    pub partition_spec: Option<String>,
    pub field_profiles: Vec<FieldProfile>,
    pub profiled_at: DateTime<Utc>,
}

/// Logical tombstone for an entity that disappeared from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemovalSignal {
    pub urn: String,
}

/// Everything the crawl hands to an [`EntitySink`](crate::sink::EntitySink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkUnit {
    Container(ContainerEntity),
    Dataset(DatasetEntity),
    Lineage(UpstreamLineage),
    Profile(DatasetProfile),
    Removal(RemovalSignal),
}

impl WorkUnit {
    /// Stable work unit id; repeated emission of the same unit reuses it.
    pub fn id(&self) -> String {
        match self {
            WorkUnit::Container(c) => c.key.urn(),
            WorkUnit::Dataset(d) => d.identifier.urn(),
            WorkUnit::Lineage(l) => format!("{}-upstreamLineage", l.dataset),
            WorkUnit::Profile(p) => format!("profile-{}", p.dataset),
            WorkUnit::Removal(r) => format!("{}-removed", r.urn),
        }
    }

    /// Entity urn this unit describes.
    pub fn urn(&self) -> String {
        match self {
            WorkUnit::Container(c) => c.key.urn(),
            WorkUnit::Dataset(d) => d.identifier.urn(),
            WorkUnit::Lineage(l) => l.dataset.clone(),
            WorkUnit::Profile(p) => p.dataset.clone(),
            WorkUnit::Removal(r) => r.urn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier(instance: Option<&str>) -> DatasetIdentifier {
        DatasetIdentifier::new(
            "postgres",
            instance.map(str::to_string),
            "PROD",
            vec!["db".to_string(), "s1".to_string()],
            "foo",
        )
    }

    #[test]
    fn test_qualified_name_joins_schema_path() {
        assert_eq!(identifier(None).qualified_name(), "db.s1.foo");
        assert_eq!(identifier(None).to_string(), "db.s1.foo");
    }

    #[test]
    fn test_urn_includes_platform_instance() {
        assert_eq!(
            identifier(None).urn(),
            "urn:li:dataset:(urn:li:dataPlatform:postgres,db.s1.foo,PROD)"
        );
        assert_eq!(
            identifier(Some("eu")).urn(),
            "urn:li:dataset:(urn:li:dataPlatform:postgres,eu.db.s1.foo,PROD)"
        );
    }

    #[test]
    fn test_field_urn_wraps_dataset_urn() {
        let id = identifier(None);
        assert_eq!(
            id.field_urn("id"),
            format!("urn:li:schemaField:({},id)", id.urn())
        );
    }

    #[test]
    fn test_container_child_extends_path() {
        let db = ContainerKey {
            platform: "postgres".to_string(),
            platform_instance: None,
            environment: "PROD".to_string(),
            path: vec!["db".to_string()],
        };
        let schema = db.child("s1");
        assert_eq!(schema.path, vec!["db", "s1"]);
        assert_eq!(schema.urn(), "urn:li:container:(postgres,db.s1,PROD)");
        assert_ne!(db.urn(), schema.urn());
    }

    #[test]
    fn test_identifier_case_policy() {
        assert_eq!(IdentifierCase::Preserve.apply("Orders"), "Orders");
        assert_eq!(IdentifierCase::Lower.apply("Orders"), "orders");
        assert_eq!(IdentifierCase::Upper.apply("Orders"), "ORDERS");
    }

    #[test]
    fn test_column_descriptor_builder() {
        let column = ColumnDescriptor::new("ds", "string", 3)
            .with_nullable(false)
            .with_comment("partition date")
            .with_partition_key(true);
        assert_eq!(column.ordinal, 3);
        assert!(!column.nullable);
        assert!(column.is_partition_key);
        assert_eq!(column.comment.as_deref(), Some("partition date"));
    }

    #[test]
    fn test_work_unit_ids_are_stable() {
        let removal = WorkUnit::Removal(RemovalSignal {
            urn: identifier(None).urn(),
        });
        assert_eq!(removal.id(), removal.clone().id());
        assert!(removal.id().ends_with("-removed"));
        assert_eq!(removal.urn(), identifier(None).urn());
    }

    #[test]
    fn test_type_category_display() {
        assert_eq!(TypeCategory::Number.to_string(), "Number");
        assert_eq!(TypeCategory::Unknown.to_string(), "Unknown");
    }
}
