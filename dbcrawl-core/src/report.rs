//! Accumulated run report.
//!
//! Entity- and schema-scoped failures never stop a crawl; they land here
//! instead. The report is the user-visible summary of a run's health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Warning key under which datasets with zero columns are recorded.
pub const MISSING_COLUMN_INFO: &str = "missing column information";

/// Scope of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Catalog session could not be established; the run aborted
    Connection,
    /// Listing tables or views of one schema failed
    SchemaEnumeration,
    /// Introspecting or emitting one table/view failed
    EntityProcessing,
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFailure {
    /// Scope of the failure
    pub kind: FailureKind,
    /// Database, `database.schema` or dataset name
    pub key: String,
    /// Rendered error
    pub message: String,
}

/// Counters and diagnostics for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Unique id of the run, also stored in the checkpoint
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Set once the run completes without a fatal error
    pub finished_at: Option<DateTime<Utc>>,
    /// Tables that passed dedup, filtered or not
    pub tables_scanned: u64,
    /// Views that passed dedup, filtered or not
    pub views_scanned: u64,
    /// Profiles emitted
    pub entities_profiled: u64,
    /// Work units accepted by the sink
    pub work_units_emitted: u64,
    /// Removal signals emitted
    pub stale_entities_removed: u64,
    /// Names rejected by a filter pattern
    pub filtered: Vec<String>,
    /// Warning reasons keyed by warning kind or dataset name
    pub warnings: BTreeMap<String, Vec<String>>,
    /// Entity- and schema-scoped failures, in the order they occurred
    pub failures: Vec<CrawlFailure>,
}

impl Default for CrawlReport {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlReport {
    /// Starts a report for a new run.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            tables_scanned: 0,
            views_scanned: 0,
            entities_profiled: 0,
            work_units_emitted: 0,
            stale_entities_removed: 0,
            filtered: Vec::new(),
            warnings: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Counts a table or view that passed dedup.
    pub fn report_entity_scanned(&mut self, is_view: bool) {
        if is_view {
            self.views_scanned = self.views_scanned.saturating_add(1);
        } else {
            self.tables_scanned = self.tables_scanned.saturating_add(1);
        }
    }

    /// Records a name rejected by a filter.
    pub fn report_dropped(&mut self, name: impl Into<String>) {
        self.filtered.push(name.into());
    }

    /// Records a warning reason under a key.
    pub fn report_warning(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.warnings
            .entry(key.into())
            .or_default()
            .push(reason.into());
    }

    /// Records a failure.
    pub fn report_failure(
        &mut self,
        kind: FailureKind,
        key: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.failures.push(CrawlFailure {
            kind,
            key: key.into(),
            message: message.into(),
        });
    }

    /// Counts an emitted profile.
    pub fn report_entity_profiled(&mut self) {
        self.entities_profiled = self.entities_profiled.saturating_add(1);
    }

    /// Counts a work unit the sink accepted.
    pub fn report_work_unit(&mut self) {
        self.work_units_emitted = self.work_units_emitted.saturating_add(1);
    }

    /// Counts an emitted removal signal.
    pub fn report_stale_entity_removed(&mut self) {
        self.stale_entities_removed = self.stale_entities_removed.saturating_add(1);
    }

    /// Returns true if the dataset was recorded with zero columns.
    pub fn has_missing_column_info(&self, dataset_name: &str) -> bool {
        self.warnings
            .get(MISSING_COLUMN_INFO)
            .is_some_and(|names| names.iter().any(|n| n == dataset_name))
    }

    /// Failures of one kind.
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &CrawlFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    /// Total number of warning reasons across all keys.
    pub fn warning_count(&self) -> usize {
        self.warnings.values().map(Vec::len).sum()
    }

    /// Marks the run as finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl std::fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(f, "  Tables scanned:   {}", self.tables_scanned)?;
        writeln!(f, "  Views scanned:    {}", self.views_scanned)?;
        writeln!(f, "  Profiled:         {}", self.entities_profiled)?;
        writeln!(f, "  Work units:       {}", self.work_units_emitted)?;
        writeln!(f, "  Stale removed:    {}", self.stale_entities_removed)?;
        writeln!(f, "  Filtered:         {}", self.filtered.len())?;
        writeln!(f, "  Warnings:         {}", self.warning_count())?;
        write!(f, "  Failures:         {}", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "\n    [{:?}] {}: {}",
                failure.kind, failure.key, failure.message
            )?;
        }
        Ok(())
    }
}
