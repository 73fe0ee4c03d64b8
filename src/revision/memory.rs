//! Process-local revision store

use super::{RevisionError, RevisionTable, RevisionTracker, StoredRevision};
use crate::replication::{Revision, StreamCategory};
use std::sync::{Mutex, MutexGuard};

/// Revision tracker that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryRevisionTracker {
    table: Mutex<RevisionTable>,
}

impl MemoryRevisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored entry
    pub fn entries(&self) -> Vec<(String, StoredRevision)> {
        self.lock()
            .iter()
            .map(|(name, entry)| (name.to_string(), *entry))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, RevisionTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RevisionTracker for MemoryRevisionTracker {
    fn revision(&self, category: StreamCategory, stream: &str) -> Option<Revision> {
        self.lock().get(category, stream)
    }

    fn reset(&self, stream: &str) -> Result<(), RevisionError> {
        self.lock().reset(stream);
        Ok(())
    }

    fn update(
        &self,
        category: StreamCategory,
        stream: &str,
        revision: Revision,
    ) -> Result<(), RevisionError> {
        self.lock().advance(category, stream, revision);
        Ok(())
    }
}
