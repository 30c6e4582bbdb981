//! Checkpoint persistence.
//!
//! A [`CheckpointState`] is the set of entity urns one run saw. It is loaded
//! once when a run starts, never mutated during the walk, and replaced only
//! after the run completes successfully. The [`CheckpointStore`] trait
//! decouples where checkpoints live from the crawler:
//!
//! - [`MemoryCheckpointStore`]: process-local, for tests and embedding
//! - [`JsonFileCheckpointStore`]: one JSON file per job id
//!
//! Concurrent runs of the same job are not supported; callers serialize
//! them.

use crate::{Result, error::CrawlError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Entity urns seen by one run of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Job this checkpoint belongs to
    pub job_id: String,
    /// Run that wrote it; `None` before the first save
    pub run_id: Option<Uuid>,
    pub saved_at: Option<DateTime<Utc>>,
    /// Sorted so saved files diff cleanly between runs
    pub urns: BTreeSet<String>,
}

impl CheckpointState {
    /// Empty checkpoint, as used when a job has never run.
    pub fn empty(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: None,
            saved_at: None,
            urns: BTreeSet::new(),
        }
    }

    /// Checkpoint for a completed run.
    pub fn new(job_id: impl Into<String>, run_id: Uuid, urns: BTreeSet<String>) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: Some(run_id),
            saved_at: Some(Utc::now()),
            urns,
        }
    }

    /// Returns true when no urns are recorded.
    pub fn is_empty(&self) -> bool {
        self.urns.is_empty()
    }
}

/// Persisted key/value store for checkpoints, keyed by job id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads the last checkpoint of a job.
    ///
    /// A job with no checkpoint yet yields [`CheckpointState::empty`].
    async fn load(&self, job_id: &str) -> Result<CheckpointState>;

    /// Replaces the checkpoint of a job.
    async fn save(&self, job_id: &str, state: &CheckpointState) -> Result<()>;
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, CheckpointState>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a checkpoint, replacing any existing one.
    pub fn insert(&self, state: CheckpointState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.job_id.clone(), state);
    }

    /// Returns the stored checkpoint of a job, if any.
    pub fn get(&self, job_id: &str) -> Option<CheckpointState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, job_id: &str) -> Result<CheckpointState> {
        Ok(self
            .get(job_id)
            .unwrap_or_else(|| CheckpointState::empty(job_id)))
    }

    async fn save(&self, job_id: &str, state: &CheckpointState) -> Result<()> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.to_string(), state.clone());
        Ok(())
    }
}

/// Checkpoint store keeping one `<job_id>.checkpoint.json` file per job.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
}

impl JsonFileCheckpointStore {
    /// Creates a store rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the checkpoint file for a job.
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", job_id))
    }

    /// Directory checkpoint files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self, job_id: &str) -> Result<CheckpointState> {
        let path = self.path_for(job_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No checkpoint for job '{}' at {}", job_id, path.display());
                return Ok(CheckpointState::empty(job_id));
            }
            Err(e) => {
                return Err(CrawlError::checkpoint_failed(
                    format!("Failed to read checkpoint {}", path.display()),
                    e,
                ));
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            CrawlError::checkpoint_failed(
                format!("Failed to parse checkpoint {}", path.display()),
                e,
            )
        })
    }

    async fn save(&self, job_id: &str, state: &CheckpointState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CrawlError::checkpoint_failed(
                format!("Failed to create checkpoint directory {}", self.dir.display()),
                e,
            )
        })?;

        let path = self.path_for(job_id);
        let json = serde_json::to_string_pretty(state).map_err(|e| CrawlError::Serialization {
            context: format!("Failed to serialize checkpoint for job '{}'", job_id),
            source: e,
        })?;

        // Write to a temp file, then rename over the previous checkpoint
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await.map_err(|e| {
            CrawlError::checkpoint_failed(format!("Failed to write {}", temp_path.display()), e)
        })?;
        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            CrawlError::checkpoint_failed(format!("Failed to replace {}", path.display()), e)
        })?;

        tracing::debug!(
            "Saved checkpoint for job '{}' with {} urns",
            job_id,
            state.urns.len()
        );
        Ok(())
    }
}
