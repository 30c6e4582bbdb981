//! Profile candidate selection and dispatch.
//!
//! Profiling is the one fan-out stage of a crawl. While the walk runs,
//! eligible tables become [`ProfileRequest`]s; once the walk ends, requests
//! are dispatched across a bounded worker pool and every result is emitted
//! as its own work unit. Profiling problems are warnings, never failures.

use crate::{
    Result,
    config::ProfilingConfig,
    filter::PatternFilter,
    inspector::DatabaseInspector,
    models::{DatasetIdentifier, DatasetProfile, ProfileRequest, WorkUnit},
    report::CrawlReport,
    sink::EntitySink,
};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Thresholds a dialect uses to pick profile candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileThresholds {
    /// Only tables updated within this many days
    pub updated_since_days: Option<f64>,
    /// Only tables at most this many megabytes
    pub size_limit_mb: Option<u64>,
    /// Only tables with at most this many rows
    pub row_limit: Option<u64>,
}

impl ProfileThresholds {
    /// Returns true when any threshold is set.
    pub fn is_configured(&self) -> bool {
        self.updated_since_days.is_some() || self.size_limit_mb.is_some() || self.row_limit.is_some()
    }
}

/// Picks the tables of a schema that satisfy the profiling thresholds.
pub struct ProfileCandidateSelector;

impl ProfileCandidateSelector {
    /// Returns the candidate table names of a schema, or `None` when no
    /// candidate filtering applies.
    ///
    /// `None` is returned when no threshold is configured and when the
    /// dialect does not support candidate generation.
    ///
    /// # Errors
    /// Propagates any other inspector error.
    pub async fn select(
        inspector: &dyn DatabaseInspector,
        schema: &str,
        thresholds: &ProfileThresholds,
    ) -> Result<Option<BTreeSet<String>>> {
        if !thresholds.is_configured() {
            return Ok(None);
        }

        match inspector.profile_candidates(schema, thresholds).await {
            Ok(candidates) => {
                debug!(
                    "Schema '{}' has {} profile candidates",
                    schema,
                    candidates.len()
                );
                Ok(Some(candidates.into_iter().collect()))
            }
            Err(e) if e.is_not_supported() => {
                debug!(
                    "Profile candidate selection not supported, using patterns only: {}",
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Final profiling eligibility of one table.
///
/// `qualified_name` is matched against both patterns; `table` is looked up
/// in the candidate set.
pub fn is_eligible(
    qualified_name: &str,
    table: &str,
    table_filter: &PatternFilter,
    profile_filter: &PatternFilter,
    candidates: Option<&BTreeSet<String>>,
) -> bool {
    table_filter.allowed(qualified_name)
        && profile_filter.allowed(qualified_name)
        && candidates.is_none_or(|set| set.contains(table))
}

/// Builds the profile request for an eligible table, resolving partitions.
///
/// Returns `None` when the table must be skipped: a partitioned table with
/// no usable partition, or a partition while partition profiling is off.
pub async fn plan_profile_request(
    inspector: &dyn DatabaseInspector,
    dataset: &DatasetIdentifier,
    schema: &str,
    table: &str,
    config: &ProfilingConfig,
    report: &mut CrawlReport,
) -> Option<ProfileRequest> {
    let name = dataset.qualified_name();

    let partition = match inspector
        .partition_profile_query(table, schema, config.partition_datetime)
        .await
    {
        Ok(partition) => partition,
        Err(e) if e.is_not_supported() => None,
        Err(e) => {
            warn!("Failed to resolve profiling partition for {}: {}", name, e);
            report.report_warning(name, format!("profile skipped: {}", e));
            return None;
        }
    };

    if partition.is_none() {
        let partitioned = inspector
            .is_table_partitioned(table, schema)
            .await
            .unwrap_or(false);
        if partitioned {
            warn!("Skipping profile of {}: no usable partition", name);
            report.report_warning(
                name,
                "profile skipped as partitioned table is empty or partition id was invalid",
            );
            return None;
        }
    }

    if partition.is_some() && !config.partition_profiling_enabled {
        debug!("Skipping profile of {}: partition profiling disabled", name);
        if config.report_dropped_profiles {
            report.report_dropped(format!("profile of {}", name));
        }
        return None;
    }

    let partition = partition.unwrap_or_default();
    Some(ProfileRequest {
        dataset: dataset.clone(),
        schema: schema.to_string(),
        table: table.to_string(),
        partition_spec: partition.partition,
        custom_query: partition.custom_query,
    })
}

/// Computes statistics for one dataset.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Profiles the dataset named by the request.
    async fn profile(&self, request: &ProfileRequest) -> Result<DatasetProfile>;
}

/// Dispatches profile requests over a bounded pool.
///
/// Results arrive in completion order and are emitted one by one. A failed
/// profile or a failed emission is recorded as a warning.
pub async fn dispatch_profiles(
    profiler: &dyn Profiler,
    requests: Vec<ProfileRequest>,
    max_workers: usize,
    sink: &dyn EntitySink,
    report: &mut CrawlReport,
) {
    if requests.is_empty() {
        return;
    }

    info!(
        "Profiling {} datasets with {} workers",
        requests.len(),
        max_workers
    );

    let profile_futures = requests.iter().map(|request| async move {
        let result = profiler.profile(request).await;
        (request.dataset.qualified_name(), result)
    });

    let mut results = stream::iter(profile_futures).buffer_unordered(max_workers.max(1));

    while let Some((name, result)) = results.next().await {
        match result {
            Ok(profile) => match sink.emit(&WorkUnit::Profile(profile)).await {
                Ok(()) => {
                    debug!("Profiled {}", name);
                    report.report_entity_profiled();
                    report.report_work_unit();
                }
                Err(e) => {
                    warn!("Failed to emit profile of {}: {}", name, e);
                    report.report_warning(name, format!("profile not emitted: {}", e));
                }
            },
            Err(e) => {
                warn!("Failed to profile {}: {}", name, e);
                report.report_warning(name, format!("profiling failed: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterPattern;

    fn filter(pattern: FilterPattern) -> PatternFilter {
        PatternFilter::compile(&pattern).unwrap()
    }

    #[test]
    fn test_thresholds_configured() {
        assert!(!ProfileThresholds::default().is_configured());
        assert!(
            ProfileThresholds {
                row_limit: Some(10),
                ..Default::default()
            }
            .is_configured()
        );
    }

    #[test]
    fn test_eligibility_combines_patterns_and_candidates() {
        let table_filter = filter(FilterPattern::allow_all().with_allow("orders"));
        let profile_filter = filter(FilterPattern::allow_all().with_deny("orders_tmp"));
        let candidates: BTreeSet<String> = ["orders".to_string()].into_iter().collect();

        assert!(is_eligible(
            "db.s1.orders",
            "orders",
            &table_filter,
            &profile_filter,
            Some(&candidates)
        ));
        assert!(!is_eligible(
            "db.s1.orders_tmp",
            "orders_tmp",
            &table_filter,
            &profile_filter,
            Some(&candidates)
        ));
        assert!(!is_eligible(
            "db.s1.orders_archive",
            "orders_archive",
            &table_filter,
            &profile_filter,
            Some(&candidates)
        ));
    }

    #[test]
    fn test_no_candidate_set_defers_to_patterns() {
        let allow_all = PatternFilter::allow_all();
        assert!(is_eligible("db.s1.any", "any", &allow_all, &allow_all, None));
    }
}
