//! Snapshot Persistence Module
//!
//! Loads the cache store from a JSON snapshot at startup and writes it back
//! whenever the store is dirty.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::SharedCache;
use crate::error::SnapshotError;

// == Outcomes ==
/// Result of a startup load. Every variant leaves the store usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No snapshot file exists
    Missing,
    /// The file exists but holds nothing
    Empty,
    /// The file could not be read or parsed; started cold
    Corrupt,
    /// Entries restored from disk
    Loaded { entries: usize },
}

/// Result of a flush attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Store was clean, nothing written
    Skipped,
    /// Snapshot written to disk
    Written { entries: usize },
}

// == Persistence Manager ==
/// Moves cache contents between the shared store and one snapshot file.
#[derive(Debug)]
pub struct PersistenceManager {
    cache: SharedCache,
    path: PathBuf,
    /// Serializes flushes so the timer and shutdown never write concurrently
    flush_lock: Mutex<()>,
}

impl PersistenceManager {
    pub fn new(cache: SharedCache, path: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            path: path.into(),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Load ==
    /// Populates the store from the snapshot file.
    ///
    /// Missing, empty or unparsable files are logged and leave the store
    /// cold; this never fails.
    pub async fn load(&self) -> LoadOutcome {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No cache snapshot found, starting cold");
                return LoadOutcome::Missing;
            }
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "Failed to read cache snapshot");
                return LoadOutcome::Corrupt;
            }
        };

        if raw.trim().is_empty() {
            warn!(path = %self.path.display(), "Skipped loading: cache snapshot is empty");
            return LoadOutcome::Empty;
        }

        let entries: Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "Failed to parse cache snapshot");
                return LoadOutcome::Corrupt;
            }
        };

        let count = entries.len();
        self.cache.write().await.mset(entries);
        info!(path = %self.path.display(), entries = count, "Loaded cache from disk");

        LoadOutcome::Loaded { entries: count }
    }

    // == Flush ==
    /// Writes the store to disk if it is dirty.
    ///
    /// The dirty flag is cleared only after the file is in place, and only
    /// up to the snapshot that was written. On failure the store stays dirty
    /// so the next flush retries.
    pub async fn flush(&self) -> Result<FlushOutcome, SnapshotError> {
        let _flushing = self.flush_lock.lock().await;

        let snapshot = {
            let cache = self.cache.read().await;
            if !cache.is_dirty() {
                debug!("Cache clean, skipping snapshot flush");
                return Ok(FlushOutcome::Skipped);
            }
            cache.snapshot()
        };

        if let Err(err) = self.write_snapshot(&snapshot.entries).await {
            error!(path = %self.path.display(), error = %err, "Failed to save cache");
            return Err(err);
        }

        self.cache.write().await.mark_flushed(snapshot.seq);

        let entries = snapshot.entries.len();
        info!(path = %self.path.display(), entries, "Saved cache to disk");
        Ok(FlushOutcome::Written { entries })
    }

    /// Writes the whole file next to the target, then renames it into place.
    async fn write_snapshot<T: serde::Serialize>(&self, entries: &T) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(entries)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
