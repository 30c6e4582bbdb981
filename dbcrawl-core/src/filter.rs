//! Allow/deny name filtering.
//!
//! A [`FilterPattern`] is the serializable configuration value; a
//! [`PatternFilter`] is its compiled form. One filter exists per level of the
//! walk (database, schema, table, view, profile) and the levels are ANDed as
//! the walk descends.

use crate::{Result, error::CrawlError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Allow/deny regex lists for one filterable level.
///
/// # Example
/// ```rust
/// use dbcrawl_core::filter::{FilterPattern, PatternFilter};
///
/// let pattern = FilterPattern::allow_all().with_deny(".*_staging$");
/// let filter = PatternFilter::compile(&pattern).unwrap();
///
/// assert!(filter.allowed("s1"));
/// assert!(!filter.allowed("s1_staging"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPattern {
    /// Names must match at least one of these; empty means allow-all
    pub allow: Vec<String>,
    /// Names matching any of these are rejected, whatever `allow` says
    pub deny: Vec<String>,
    /// Whether matching ignores case
    pub ignore_case: bool,
}

impl Default for FilterPattern {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl FilterPattern {
    /// Pattern that accepts every name.
    pub fn allow_all() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            ignore_case: true,
        }
    }

    /// Builder method to add an allow regex.
    pub fn with_allow(mut self, regex: impl Into<String>) -> Self {
        self.allow.push(regex.into());
        self
    }

    /// Builder method to add a deny regex.
    pub fn with_deny(mut self, regex: impl Into<String>) -> Self {
        self.deny.push(regex.into());
        self
    }

    /// Builder method to set case sensitivity.
    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// Returns true when the pattern can never reject a name.
    pub fn is_allow_all(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Compiled allow/deny rule set.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl PatternFilter {
    /// Compiles every regex in the pattern.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid regex.
    pub fn compile(pattern: &FilterPattern) -> Result<Self> {
        let build = |sources: &[String]| -> Result<Vec<Regex>> {
            sources
                .iter()
                .map(|source| {
                    RegexBuilder::new(source)
                        .case_insensitive(pattern.ignore_case)
                        .build()
                        .map_err(|e| {
                            CrawlError::configuration(format!(
                                "Invalid filter pattern '{}': {}",
                                source, e
                            ))
                        })
                })
                .collect()
        };

        Ok(Self {
            allow: build(&pattern.allow)?,
            deny: build(&pattern.deny)?,
        })
    }

    /// Filter that accepts every name.
    pub fn allow_all() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }

    /// Deny first, then empty allow means allow-all, else any allow match.
    pub fn allowed(&self, name: &str) -> bool {
        if self.deny.iter().any(|re| re.is_match(name)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(name))
    }
}

impl Default for PatternFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_allows_everything() {
        let filter = PatternFilter::compile(&FilterPattern::default()).unwrap();
        assert!(filter.allowed("anything"));
        assert!(filter.allowed(""));
    }

    #[test]
    fn test_deny_takes_precedence_over_allow() {
        let pattern = FilterPattern::allow_all()
            .with_allow("orders.*")
            .with_deny(".*_tmp$");
        let filter = PatternFilter::compile(&pattern).unwrap();

        assert!(filter.allowed("orders"));
        assert!(!filter.allowed("orders_tmp"));
        assert!(!filter.allowed("customers"));
    }

    #[test]
    fn test_case_sensitivity() {
        let insensitive =
            PatternFilter::compile(&FilterPattern::allow_all().with_allow("^orders$")).unwrap();
        assert!(insensitive.allowed("ORDERS"));

        let sensitive = PatternFilter::compile(
            &FilterPattern::allow_all()
                .with_allow("^orders$")
                .with_ignore_case(false),
        )
        .unwrap();
        assert!(!sensitive.allowed("ORDERS"));
        assert!(sensitive.allowed("orders"));
    }

    #[test]
    fn test_patterns_are_unanchored() {
        let filter =
            PatternFilter::compile(&FilterPattern::allow_all().with_allow("s1\\.")).unwrap();
        assert!(filter.allowed("db.s1.foo"));
        assert!(!filter.allowed("db.s2.foo"));
    }

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let err = PatternFilter::compile(&FilterPattern::allow_all().with_deny("(unclosed"))
            .unwrap_err();
        assert!(matches!(err, CrawlError::Configuration { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_pattern_deserializes_with_defaults() {
        let pattern: FilterPattern = serde_json::from_str(r#"{"deny": ["^tmp_"]}"#).unwrap();
        assert!(pattern.allow.is_empty());
        assert!(pattern.ignore_case);
        assert!(!pattern.is_allow_all());
    }
}
