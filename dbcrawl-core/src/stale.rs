//! Stale entity removal.
//!
//! After a successful walk, urns present in the previous checkpoint but not
//! seen this run are emitted as removal signals, then the current seen-set
//! replaces the checkpoint. A run that failed fatally or was cancelled never
//! reaches this step, so no removals are inferred from a partial walk.

use crate::{
    Result,
    models::{RemovalSignal, WorkUnit},
    report::CrawlReport,
    sink::EntitySink,
    state::{CheckpointState, CheckpointStore},
};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Urns in `previous` that are absent from `current`.
pub fn diff(current: &BTreeSet<String>, previous: &CheckpointState) -> BTreeSet<String> {
    previous.urns.difference(current).cloned().collect()
}

/// Mark-and-compare pass over one job's checkpoint.
pub struct StaleEntityRemover<'a> {
    store: &'a dyn CheckpointStore,
    job_id: &'a str,
    remove_stale_metadata: bool,
}

impl<'a> StaleEntityRemover<'a> {
    /// Remover for one job with removal emission enabled.
    pub fn new(store: &'a dyn CheckpointStore, job_id: &'a str) -> Self {
        Self {
            store,
            job_id,
            remove_stale_metadata: true,
        }
    }

    /// Builder method to toggle removal emission. The checkpoint is saved
    /// either way.
    pub fn with_remove_stale_metadata(mut self, enabled: bool) -> Self {
        self.remove_stale_metadata = enabled;
        self
    }

    /// Loads the previous checkpoint for this job.
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub async fn load_previous(&self) -> Result<CheckpointState> {
        self.store.load(self.job_id).await
    }

    /// Emits one removal signal per stale urn. Nothing is written to the
    /// store; call [`save`](Self::save) once the sink has been flushed.
    ///
    /// Returns the stale urns, emitted or not.
    ///
    /// # Errors
    /// Returns error if a removal cannot be emitted
    pub async fn emit_removals(
        &self,
        current: &BTreeSet<String>,
        previous: &CheckpointState,
        sink: &dyn EntitySink,
        report: &mut CrawlReport,
    ) -> Result<BTreeSet<String>> {
        let stale = diff(current, previous);

        if self.remove_stale_metadata {
            for urn in &stale {
                debug!("Emitting removal for stale entity {}", urn);
                sink.emit(&WorkUnit::Removal(RemovalSignal { urn: urn.clone() }))
                    .await?;
                report.report_work_unit();
                report.report_stale_entity_removed();
            }
        } else if !stale.is_empty() {
            debug!(
                "Skipping {} removals, stale metadata removal disabled",
                stale.len()
            );
        }

        Ok(stale)
    }

    /// Persists `current` as this job's checkpoint.
    ///
    /// # Errors
    /// Returns error if the checkpoint cannot be saved
    pub async fn save(&self, current: BTreeSet<String>, run_id: Uuid) -> Result<()> {
        let checkpoint = CheckpointState::new(self.job_id, run_id, current);
        self.store.save(self.job_id, &checkpoint).await?;

        info!(
            "Checkpoint saved for job '{}': {} entities",
            self.job_id,
            checkpoint.urns.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sink::MemorySink, state::MemoryCheckpointStore};

    fn urns(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_diff_is_set_difference() {
        let previous = CheckpointState::new("job", Uuid::new_v4(), urns(&["a", "b", "c"]));
        assert_eq!(diff(&urns(&["b", "c", "d"]), &previous), urns(&["a"]));
        assert!(diff(&urns(&["a", "b", "c"]), &previous).is_empty());
        assert!(diff(&urns(&[]), &CheckpointState::empty("job")).is_empty());
    }

    #[tokio::test]
    async fn test_removals_emitted_before_save() {
        let store = MemoryCheckpointStore::new();
        store.insert(CheckpointState::new("job", Uuid::new_v4(), urns(&["x", "y"])));

        let sink = MemorySink::new();
        let mut report = CrawlReport::new();
        let remover = StaleEntityRemover::new(&store, "job");
        let previous = remover.load_previous().await.unwrap();

        let current = urns(&["y", "z"]);
        let removed = remover
            .emit_removals(&current, &previous, &sink, &mut report)
            .await
            .unwrap();

        assert_eq!(removed, urns(&["x"]));
        assert_eq!(sink.units().len(), 1);
        assert_eq!(sink.units()[0].urn(), "x");
        assert_eq!(report.stale_entities_removed, 1);
        assert_eq!(store.get("job").unwrap().urns, urns(&["x", "y"]));

        remover.save(current, report.run_id).await.unwrap();
        let saved = store.get("job").unwrap();
        assert_eq!(saved.urns, urns(&["y", "z"]));
        assert_eq!(saved.run_id, Some(report.run_id));
    }

    #[tokio::test]
    async fn test_disabled_removal_still_saves() {
        let store = MemoryCheckpointStore::new();
        store.insert(CheckpointState::new("job", Uuid::new_v4(), urns(&["x"])));

        let sink = MemorySink::new();
        let mut report = CrawlReport::new();
        let remover = StaleEntityRemover::new(&store, "job").with_remove_stale_metadata(false);
        let previous = remover.load_previous().await.unwrap();

        let stale = remover
            .emit_removals(&urns(&[]), &previous, &sink, &mut report)
            .await
            .unwrap();
        remover.save(urns(&[]), report.run_id).await.unwrap();

        assert_eq!(stale, urns(&["x"]));

        assert!(sink.units().is_empty());
        assert!(store.get("job").unwrap().is_empty());
    }
}
