//! Native column type to canonical [`TypeCategory`] mapping.
//!
//! The mapper holds an ordered rule list; the first rule whose matcher
//! accepts the native type wins, so specific rules sit before general ones
//! (`interval` before the `int` prefix, `[]` arrays before their element
//! type). Custom rules are registered on the mapper instance and always run
//! before the built-in rules. There is no process-wide registry.
//!
//! Matching is done on a normalized form of the native type: trimmed,
//! lower-cased, with any parameter list (`varchar(255)`, `struct<a:int>`)
//! stripped for exact and prefix matchers.

use crate::{Result, error::CrawlError, models::TypeCategory};
use regex::Regex;
use std::collections::HashSet;

/// How a rule recognizes a native type.
#[derive(Debug, Clone)]
pub enum TypeMatcher {
    /// Base type name equals the value
    Exact(String),
    /// Base type name starts with the value
    Prefix(String),
    /// Full normalized type ends with the value
    Suffix(String),
    /// Regex over the full normalized type
    Pattern(Regex),
}

impl TypeMatcher {
    /// Exact base-name matcher; the value is lower-cased.
    pub fn exact(name: impl AsRef<str>) -> Self {
        Self::Exact(name.as_ref().to_lowercase())
    }

    /// Base-name prefix matcher; the value is lower-cased.
    pub fn prefix(prefix: impl AsRef<str>) -> Self {
        Self::Prefix(prefix.as_ref().to_lowercase())
    }

    /// Full-type suffix matcher; the value is lower-cased.
    pub fn suffix(suffix: impl AsRef<str>) -> Self {
        Self::Suffix(suffix.as_ref().to_lowercase())
    }

    /// Regex matcher, applied to the lower-cased full type.
    ///
    /// # Errors
    /// Returns a configuration error if the regex does not compile.
    pub fn pattern(regex: &str) -> Result<Self> {
        Regex::new(regex).map(Self::Pattern).map_err(|e| {
            CrawlError::configuration(format!("Invalid type pattern '{}': {}", regex, e))
        })
    }

    fn matches(&self, native: &NormalizedType) -> bool {
        match self {
            TypeMatcher::Exact(name) => native.base == *name,
            TypeMatcher::Prefix(prefix) => native.base.starts_with(prefix.as_str()),
            TypeMatcher::Suffix(suffix) => native.full.ends_with(suffix.as_str()),
            TypeMatcher::Pattern(re) => re.is_match(&native.full),
        }
    }
}

struct NormalizedType {
    full: String,
    base: String,
}

impl NormalizedType {
    fn new(native: &str) -> Self {
        let full = native.trim().to_lowercase();
        let base = full
            .split(['(', '<'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Self { full, base }
    }
}

/// Result of mapping one native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMapping {
    pub category: TypeCategory,
    /// False when the type was not recognized and a warning is due
    pub matched: bool,
}

#[derive(Debug, Clone)]
struct TypeRule {
    matcher: TypeMatcher,
    category: TypeCategory,
}

/// Ordered rule registry mapping native types to canonical categories.
///
/// # Example
/// ```rust
/// use dbcrawl_core::models::TypeCategory;
/// use dbcrawl_core::type_mapping::{TypeMapper, TypeMatcher};
///
/// let mapper = TypeMapper::new().with_rule(TypeMatcher::exact("geography"), TypeCategory::Record);
///
/// assert_eq!(mapper.map("INTEGER").category, TypeCategory::Number);
/// assert_eq!(mapper.map("geography").category, TypeCategory::Record);
/// assert!(!mapper.map("mystery").matched);
/// ```
#[derive(Debug, Clone)]
pub struct TypeMapper {
    rules: Vec<TypeRule>,
    custom_rules: usize,
    known_unknown: HashSet<String>,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMapper {
    /// Mapper with the built-in rule set.
    pub fn new() -> Self {
        let mut mapper = Self::empty();
        for (matcher, category) in default_rules() {
            mapper.rules.push(TypeRule { matcher, category });
        }
        for name in ["clob", "nclob", "null", "nulltype"] {
            mapper.known_unknown.insert(name.to_string());
        }
        mapper
    }

    /// Mapper with no rules at all.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            custom_rules: 0,
            known_unknown: HashSet::new(),
        }
    }

    /// Registers a rule ahead of every built-in rule.
    ///
    /// Custom rules keep their registration order among themselves.
    pub fn with_rule(mut self, matcher: TypeMatcher, category: TypeCategory) -> Self {
        self.rules
            .insert(self.custom_rules, TypeRule { matcher, category });
        self.custom_rules = self.custom_rules.saturating_add(1);
        self
    }

    /// Registers a type that maps to `Unknown` without a warning.
    pub fn with_known_unknown(mut self, native: impl AsRef<str>) -> Self {
        self.known_unknown
            .insert(NormalizedType::new(native.as_ref()).base);
        self
    }

    /// Maps a native type; the first matching rule wins.
    pub fn map(&self, native_type: &str) -> TypeMapping {
        let normalized = NormalizedType::new(native_type);

        if let Some(rule) = self.rules.iter().find(|r| r.matcher.matches(&normalized)) {
            return TypeMapping {
                category: rule.category,
                matched: true,
            };
        }

        TypeMapping {
            category: TypeCategory::Unknown,
            matched: self.known_unknown.contains(&normalized.base),
        }
    }
}

fn default_rules() -> Vec<(TypeMatcher, TypeCategory)> {
    use TypeCategory::{Array, Boolean, Bytes, Date, Enum, Number, Record, Time};

    let mut rules = vec![
        // Array element types must not be picked up by their scalar rules
        (TypeMatcher::suffix("[]"), Array),
        (TypeMatcher::exact("array"), Array),
        (TypeMatcher::exact("_text"), Array),
        (TypeMatcher::exact("interval"), Time),
    ];

    let groups: [(&[&str], TypeCategory); 8] = [
        (
            &[
                "money",
                "smallmoney",
                "double precision",
                "double",
                "real",
                "float",
                "float4",
                "float8",
                "decimal",
                "numeric",
                "number",
                "dec",
            ],
            Number,
        ),
        (&["boolean", "bool"], Boolean),
        (&["enum", "set"], Enum),
        (
            &[
                "binary",
                "varbinary",
                "bytea",
                "blob",
                "tinyblob",
                "mediumblob",
                "longblob",
                "bit",
                "varbit",
                "bit varying",
                "regclass",
                "tsvector",
                "raw",
                "image",
            ],
            Bytes,
        ),
        (
            &[
                "char",
                "character",
                "character varying",
                "varchar",
                "nchar",
                "nvarchar",
                "text",
                "tinytext",
                "mediumtext",
                "longtext",
                "string",
                "citext",
                "name",
                "uuid",
                "inet",
                "cidr",
                "macaddr",
                "oid",
                "xml",
            ],
            TypeCategory::String,
        ),
        (&["date"], Date),
        (&["smalldatetime", "year"], Time),
        (
            &["json", "jsonb", "struct", "map", "row", "record", "object"],
            Record,
        ),
    ];

    for (names, category) in groups {
        rules.extend(names.iter().map(|n| (TypeMatcher::exact(n), category)));
    }

    // Prefix rules come last so exact names above take priority
    rules.extend([
        (TypeMatcher::prefix("int"), Number),
        (TypeMatcher::prefix("tinyint"), Number),
        (TypeMatcher::prefix("smallint"), Number),
        (TypeMatcher::prefix("mediumint"), Number),
        (TypeMatcher::prefix("bigint"), Number),
        (TypeMatcher::prefix("unsigned big int"), Number),
        (TypeMatcher::prefix("serial"), Number),
        (TypeMatcher::prefix("bigserial"), Number),
        (TypeMatcher::prefix("smallserial"), Number),
        (TypeMatcher::prefix("time"), Time),
        (TypeMatcher::prefix("datetime"), Time),
    ]);

    rules
}
