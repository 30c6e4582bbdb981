//! Crawl configuration.
//!
//! [`CrawlConfig`] is the configuration surface the crawler consumes:
//! identifier parts, per-level filter patterns, entity toggles, stateful
//! ingestion and profiling settings. Every field has a default, so a JSON
//! config file only needs the values that differ.

use crate::{
    Result,
    error::CrawlError,
    filter::{FilterPattern, PatternFilter},
    models::IdentifierCase,
    profiling::ProfileThresholds,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stale-entity tracking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatefulIngestionConfig {
    /// Whether a checkpoint is loaded and saved at all
    pub enabled: bool,
    /// Whether removal signals are emitted for entities missing this run
    pub remove_stale_metadata: bool,
    /// Carry the previous checkpoint forward instead of removing anything
    /// when the run recorded entity or schema failures
    pub fail_safe_on_failures: bool,
}

impl Default for StatefulIngestionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remove_stale_metadata: true,
            fail_safe_on_failures: false,
        }
    }
}

/// Profiling stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Whether profile requests are collected and dispatched
    pub enabled: bool,
    /// Worker pool size for profile dispatch (1-64)
    pub max_workers: usize,
    /// Only profile tables updated within this many days
    pub profile_if_updated_since_days: Option<f64>,
    /// Only profile tables at most this large
    pub profile_table_size_limit_mb: Option<u64>,
    /// Only profile tables with at most this many rows
    pub profile_table_row_limit: Option<u64>,
    /// Whether tables excluded from profiling are reported as dropped
    pub report_dropped_profiles: bool,
    /// Whether partitioned tables are profiled one partition at a time
    pub partition_profiling_enabled: bool,
    /// Point in time used to pick the partition to profile
    pub partition_datetime: Option<DateTime<Utc>>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_workers: 4,
            profile_if_updated_since_days: None,
            profile_table_size_limit_mb: None,
            profile_table_row_limit: None,
            report_dropped_profiles: false,
            partition_profiling_enabled: true,
            partition_datetime: None,
        }
    }
}

impl ProfilingConfig {
    /// Validates the profiling configuration.
    ///
    /// # Errors
    /// Returns error if the worker count or a threshold is out of range
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 || self.max_workers > 64 {
            return Err(CrawlError::configuration(
                "profiling.max_workers must be between 1 and 64",
            ));
        }

        if let Some(days) = self.profile_if_updated_since_days
            && (!days.is_finite() || days <= 0.0)
        {
            return Err(CrawlError::configuration(
                "profiling.profile_if_updated_since_days must be a positive number",
            ));
        }

        Ok(())
    }

    /// Candidate-selection thresholds derived from this config.
    pub fn thresholds(&self) -> ProfileThresholds {
        ProfileThresholds {
            updated_since_days: self.profile_if_updated_since_days,
            size_limit_mb: self.profile_table_size_limit_mb,
            row_limit: self.profile_table_row_limit,
        }
    }

    /// Builder method to enable/disable profiling.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the worker pool size with validation.
    pub fn with_max_workers(mut self, max_workers: usize) -> Result<Self> {
        if max_workers == 0 || max_workers > 64 {
            return Err(CrawlError::configuration(
                "profiling.max_workers must be between 1 and 64",
            ));
        }
        self.max_workers = max_workers;
        Ok(self)
    }

    /// Builder method to set the table size threshold.
    pub fn with_size_limit_mb(mut self, limit: u64) -> Self {
        self.profile_table_size_limit_mb = Some(limit);
        self
    }

    /// Builder method to set the row count threshold.
    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.profile_table_row_limit = Some(limit);
        self
    }

    /// Builder method to set the update recency threshold.
    pub fn with_updated_since_days(mut self, days: f64) -> Self {
        self.profile_if_updated_since_days = Some(days);
        self
    }

    /// Builder method to enable/disable dropped-profile reporting.
    pub fn with_report_dropped_profiles(mut self, enabled: bool) -> Self {
        self.report_dropped_profiles = enabled;
        self
    }
}

/// Configuration for one crawl job.
///
/// # Example
/// ```rust
/// use dbcrawl_core::config::CrawlConfig;
/// use dbcrawl_core::filter::FilterPattern;
///
/// let config = CrawlConfig::new()
///     .with_job_id("warehouse")
///     .with_schema_pattern(FilterPattern::allow_all().with_deny(".*_staging$"));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Platform name override; the inspector's platform is used when unset
    pub platform: Option<String>,
    /// Label distinguishing deployments of the same platform
    pub platform_instance: Option<String>,
    /// Environment tag carried by every identifier
    pub env: String,
    /// Stable job identifier keying the checkpoint
    pub job_id: String,
    pub database_pattern: FilterPattern,
    pub schema_pattern: FilterPattern,
    /// Evaluated against `database.schema.table`
    pub table_pattern: FilterPattern,
    /// Evaluated against `database.schema.view`
    pub view_pattern: FilterPattern,
    /// Evaluated against `database.schema.table`
    pub profile_pattern: FilterPattern,
    /// Whether tables are crawled
    pub include_tables: bool,
    /// Whether views are crawled
    pub include_views: bool,
    /// Whether a lineage edge to the table's storage location is emitted
    pub include_table_location_lineage: bool,
    /// Case policy for every identifier part
    pub identifier_case: IdentifierCase,
    /// Whether top-level containers are tagged `Catalog` instead of `Database`
    pub use_catalog_subtype: bool,
    /// Checkpoint and stale-removal settings
    pub stateful_ingestion: StatefulIngestionConfig,
    /// Profiling stage settings
    pub profiling: ProfilingConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            platform: None,
            platform_instance: None,
            env: "PROD".to_string(),
            job_id: "dbcrawl".to_string(),
            database_pattern: FilterPattern::allow_all(),
            schema_pattern: FilterPattern::allow_all(),
            table_pattern: FilterPattern::allow_all(),
            view_pattern: FilterPattern::allow_all(),
            profile_pattern: FilterPattern::allow_all(),
            include_tables: true,
            include_views: true,
            include_table_location_lineage: false,
            identifier_case: IdentifierCase::Preserve,
            use_catalog_subtype: false,
            stateful_ingestion: StatefulIngestionConfig::default(),
            profiling: ProfilingConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Creates a new crawl config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON config file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is not valid JSON, or fails
    /// validation
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CrawlError::Io {
            context: format!("Failed to read config file {}", path.display()),
            source: e,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| CrawlError::Serialization {
                context: format!("Failed to parse config file {}", path.display()),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, compiling every filter pattern.
    ///
    /// # Errors
    /// Returns error if a pattern does not compile or a value is invalid
    pub fn validate(&self) -> Result<()> {
        if self.env.trim().is_empty() {
            return Err(CrawlError::configuration("env must not be empty"));
        }

        if self.job_id.is_empty()
            || !self
                .job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(CrawlError::configuration(format!(
                "job_id '{}' must be non-empty and contain only letters, digits, '-', '_' or '.'",
                self.job_id
            )));
        }

        if !self.include_tables && !self.include_views {
            return Err(CrawlError::configuration(
                "at least one of include_tables or include_views must be enabled",
            ));
        }

        for pattern in [
            &self.database_pattern,
            &self.schema_pattern,
            &self.table_pattern,
            &self.view_pattern,
            &self.profile_pattern,
        ] {
            PatternFilter::compile(pattern)?;
        }

        self.profiling.validate()
    }

    /// Builder method to set the platform name.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Builder method to set the platform instance.
    pub fn with_platform_instance(mut self, instance: impl Into<String>) -> Self {
        self.platform_instance = Some(instance.into());
        self
    }

    /// Builder method to set the environment tag.
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Builder method to set the job id.
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Builder method to set the database pattern.
    pub fn with_database_pattern(mut self, pattern: FilterPattern) -> Self {
        self.database_pattern = pattern;
        self
    }

    /// Builder method to set the schema pattern.
    pub fn with_schema_pattern(mut self, pattern: FilterPattern) -> Self {
        self.schema_pattern = pattern;
        self
    }

    /// Builder method to set the table pattern.
    pub fn with_table_pattern(mut self, pattern: FilterPattern) -> Self {
        self.table_pattern = pattern;
        self
    }

    /// Builder method to set the view pattern.
    pub fn with_view_pattern(mut self, pattern: FilterPattern) -> Self {
        self.view_pattern = pattern;
        self
    }

    /// Builder method to set the profile pattern.
    pub fn with_profile_pattern(mut self, pattern: FilterPattern) -> Self {
        self.profile_pattern = pattern;
        self
    }

    /// Builder method to enable/disable table crawling.
    pub fn with_tables(mut self, include: bool) -> Self {
        self.include_tables = include;
        self
    }

    /// Builder method to enable/disable view crawling.
    pub fn with_views(mut self, include: bool) -> Self {
        self.include_views = include;
        self
    }

    /// Builder method to enable/disable storage location lineage.
    pub fn with_table_location_lineage(mut self, include: bool) -> Self {
        self.include_table_location_lineage = include;
        self
    }

    /// Builder method to set the identifier case policy.
    pub fn with_identifier_case(mut self, case: IdentifierCase) -> Self {
        self.identifier_case = case;
        self
    }

    /// Builder method to enable stateful ingestion.
    pub fn with_stateful_ingestion(mut self, enabled: bool) -> Self {
        self.stateful_ingestion.enabled = enabled;
        self
    }

    /// Builder method to set the profiling config.
    pub fn with_profiling(mut self, profiling: ProfilingConfig) -> Self {
        self.profiling = profiling;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CrawlConfig::default();
        assert_eq!(config.env, "PROD");
        assert!(config.include_tables);
        assert!(config.include_views);
        assert!(!config.include_table_location_lineage);
        assert!(config.stateful_ingestion.remove_stale_metadata);
        assert!(!config.stateful_ingestion.fail_safe_on_failures);
        assert_eq!(config.profiling.max_workers, 4);
        assert!(config.profiling.partition_profiling_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_pattern_fails_validation() {
        let config =
            CrawlConfig::new().with_table_pattern(FilterPattern::allow_all().with_allow("[a-"));
        assert!(matches!(
            config.validate(),
            Err(CrawlError::Configuration { .. })
        ));
    }

    #[test]
    fn test_job_id_must_be_file_safe() {
        assert!(CrawlConfig::new().with_job_id("../etc").validate().is_err());
        assert!(CrawlConfig::new().with_job_id("").validate().is_err());
        assert!(
            CrawlConfig::new()
                .with_job_id("warehouse-prod_1.v2")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_nothing_to_crawl_is_rejected() {
        let config = CrawlConfig::new().with_tables(false).with_views(false);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_workers_bounds() {
        assert!(ProfilingConfig::default().with_max_workers(0).is_err());
        assert!(ProfilingConfig::default().with_max_workers(65).is_err());
        assert_eq!(
            ProfilingConfig::default()
                .with_max_workers(8)
                .unwrap()
                .max_workers,
            8
        );
    }

    #[test]
    fn test_thresholds_configured() {
        assert!(!ProfilingConfig::default().thresholds().is_configured());
        assert!(
            ProfilingConfig::default()
                .with_size_limit_mb(10)
                .thresholds()
                .is_configured()
        );
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.json");
        std::fs::write(
            &path,
            r#"{
                "platform_instance": "eu",
                "schema_pattern": {"deny": [".*_staging$"]},
                "profiling": {"enabled": true, "max_workers": 2}
            }"#,
        )
        .unwrap();

        let config = CrawlConfig::from_json_file(&path).unwrap();
        assert_eq!(config.platform_instance.as_deref(), Some("eu"));
        assert_eq!(config.schema_pattern.deny, vec![".*_staging$"]);
        assert!(config.profiling.enabled);
        assert_eq!(config.profiling.max_workers, 2);
        assert_eq!(config.env, "PROD");
    }

    #[test]
    fn test_from_json_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            CrawlConfig::from_json_file(&missing),
            Err(CrawlError::Io { .. })
        ));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, "{not json").unwrap();
        assert!(matches!(
            CrawlConfig::from_json_file(&invalid),
            Err(CrawlError::Serialization { .. })
        ));
    }
}
