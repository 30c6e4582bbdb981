//! Dialect hooks injected into the crawler.
//!
//! A [`Dialect`] supplies the small amount of dialect-specific behavior the
//! crawler needs while building entities: name standardisation, identifier
//! case policy, the top-level container tag and the column-to-field
//! mapping. Every hook has a default, so a dialect overrides only what
//! differs.

use crate::models::{ColumnDescriptor, ContainerSubtype, IdentifierCase};

/// Dialect-specific strategy hooks with documented defaults.
pub trait Dialect: Send + Sync {
    /// Rewrites native schema and entity names before identifiers are built.
    ///
    /// Defaults to the names unchanged. When the returned entity name
    /// differs, the crawler records the native name as the
    /// `original_table_name` property.
    fn standardize_names(&self, schema: &str, entity: &str) -> (String, String) {
        (schema.to_string(), entity.to_string())
    }

    /// Applies the identifier case policy to one name part.
    ///
    /// Defaults to the part unchanged.
    fn normalize_identifier(&self, part: &str) -> String {
        part.to_string()
    }

    /// Tag for top-level containers. Defaults to `Database`.
    fn database_subtype(&self) -> ContainerSubtype {
        ContainerSubtype::Database
    }

    /// Canonical field path for a column. Defaults to the column name.
    fn field_path(&self, column: &ColumnDescriptor) -> String {
        column.name.clone()
    }

    /// Field description for a column. Defaults to the column comment.
    fn field_description(&self, column: &ColumnDescriptor) -> Option<String> {
        column.comment.clone()
    }
}

/// Dialect that only applies a configurable case policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect {
    case: IdentifierCase,
    use_catalog_subtype: bool,
}

impl StandardDialect {
    /// Creates a dialect that preserves names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the identifier case policy.
    pub fn with_case(mut self, case: IdentifierCase) -> Self {
        self.case = case;
        self
    }

    /// Builder method to tag top-level containers as `Catalog`.
    pub fn with_catalog_subtype(mut self, enabled: bool) -> Self {
        self.use_catalog_subtype = enabled;
        self
    }
}

impl Dialect for StandardDialect {
    fn normalize_identifier(&self, part: &str) -> String {
        self.case.apply(part)
    }

    fn database_subtype(&self) -> ContainerSubtype {
        if self.use_catalog_subtype {
            ContainerSubtype::Catalog
        } else {
            ContainerSubtype::Database
        }
    }
}
