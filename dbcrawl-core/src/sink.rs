//! Entity sinks.
//!
//! An [`EntitySink`] receives every [`WorkUnit`] a crawl produces. Emission
//! is an idempotent upsert from the crawler's point of view: the same unit
//! may be delivered more than once across runs.

use crate::{Result, error::CrawlError, models::WorkUnit};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Consumer of emitted work units.
#[async_trait]
pub trait EntitySink: Send + Sync {
    /// Delivers one work unit.
    ///
    /// # Errors
    /// A failed emission is recorded against the entity being processed.
    async fn emit(&self, unit: &WorkUnit) -> Result<()>;

    /// Flushes buffered output. Called once when the run ends.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Sink that keeps every unit in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    units: Mutex<Vec<WorkUnit>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every unit emitted so far, in emission order.
    pub fn units(&self) -> Vec<WorkUnit> {
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops every collected unit.
    pub fn clear(&self) {
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl EntitySink for MemorySink {
    async fn emit(&self, unit: &WorkUnit) -> Result<()> {
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unit.clone());
        Ok(())
    }
}

/// Sink writing one JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: tokio::sync::Mutex<BufWriter<tokio::fs::File>>,
}

impl JsonLinesSink {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    /// Returns error if the file cannot be created
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| CrawlError::Io {
                context: format!("Failed to create output file {}", path.display()),
                source: e,
            })?;

        Ok(Self {
            path,
            writer: tokio::sync::Mutex::new(BufWriter::new(file)),
        })
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EntitySink for JsonLinesSink {
    async fn emit(&self, unit: &WorkUnit) -> Result<()> {
        let mut line = serde_json::to_vec(unit).map_err(|e| CrawlError::Serialization {
            context: format!("Failed to serialize work unit {}", unit.id()),
            source: e,
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| CrawlError::sink_failed(format!("Failed to write {}", unit.id()), e))
    }

    async fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await.map_err(|e| {
            CrawlError::sink_failed(format!("Failed to flush {}", self.path.display()), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemovalSignal;

    fn removal(urn: &str) -> WorkUnit {
        WorkUnit::Removal(RemovalSignal {
            urn: urn.to_string(),
        })
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.emit(&removal("a")).await.unwrap();
        sink.emit(&removal("b")).await.unwrap();

        let urns: Vec<_> = sink.units().iter().map(WorkUnit::urn).collect();
        assert_eq!(urns, vec!["a", "b"]);

        sink.clear();
        assert!(sink.units().is_empty());
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let sink = JsonLinesSink::create(&path).await.unwrap();
        sink.emit(&removal("urn:a")).await.unwrap();
        sink.emit(&removal("urn:b")).await.unwrap();
        sink.flush().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: WorkUnit = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, removal("urn:a"));
    }

    #[tokio::test]
    async fn test_json_lines_sink_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.jsonl");
        assert!(matches!(
            JsonLinesSink::create(&path).await,
            Err(CrawlError::Io { .. })
        ));
    }
}
