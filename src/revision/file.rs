//! JSON file revision store
//!
//! Mutations only touch memory and mark the table dirty; a background task
//! writes the file (temp file + rename) so callers never wait on disk. Once a
//! background write fails the store stops accepting mutations, so the caller
//! learns that its progress is no longer being saved.

use super::{RevisionError, RevisionTable, RevisionTracker};
use crate::replication::{Revision, StreamCategory};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Revision tracker persisted to a JSON file
#[derive(Debug)]
pub struct FileRevisionTracker {
    path: PathBuf,
    table: Mutex<RevisionTable>,
    dirty: Notify,
    failure: Mutex<Option<String>>,
}

impl FileRevisionTracker {
    /// Load the store, starting empty if the file does not exist yet
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RevisionError> {
        let path = path.as_ref().to_path_buf();
        let table = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => RevisionTable::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RevisionTable::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = ?path, streams = table.len(), "Loaded revision store");

        Ok(Self {
            path,
            table: Mutex::new(table),
            dirty: Notify::new(),
            failure: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current table
    pub fn snapshot(&self) -> RevisionTable {
        self.lock().clone()
    }

    /// Write the current table to disk
    pub async fn flush(&self) -> Result<(), RevisionError> {
        let content = serde_json::to_vec_pretty(&self.snapshot())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = ?self.path, "Flushed revision store");
        Ok(())
    }

    /// Spawn the task that persists the table whenever it changes.
    /// Changes within `coalesce` of each other are written together. The
    /// task ends at the first failed write, after which `reset` and `update`
    /// return [`RevisionError::Unpersisted`].
    pub fn spawn_flusher(self: &Arc<Self>, coalesce: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tracker.dirty.notified().await;
                tokio::time::sleep(coalesce).await;
                if let Err(e) = tracker.flush().await {
                    tracing::error!(error = %e, path = ?tracker.path, "Failed to flush revision store");
                    *tracker.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(e.to_string());
                    return;
                }
            }
        })
    }

    /// Reason the background flusher stopped, if it did
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn ensure_persisting(&self) -> Result<(), RevisionError> {
        match self.failure() {
            Some(reason) => Err(RevisionError::Unpersisted(reason)),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RevisionTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RevisionTracker for FileRevisionTracker {
    fn revision(&self, category: StreamCategory, stream: &str) -> Option<Revision> {
        self.lock().get(category, stream)
    }

    fn reset(&self, stream: &str) -> Result<(), RevisionError> {
        self.ensure_persisting()?;
        if self.lock().reset(stream) {
            self.dirty.notify_one();
        }
        Ok(())
    }

    fn update(
        &self,
        category: StreamCategory,
        stream: &str,
        revision: Revision,
    ) -> Result<(), RevisionError> {
        self.ensure_persisting()?;
        if self.lock().advance(category, stream, revision) {
            self.dirty.notify_one();
        }
        Ok(())
    }
}
