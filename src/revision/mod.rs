//! Revision tracking
//!
//! Persisted last-processed revision per stream. The key is the stream's
//! replication table name; the stored category guards against a name being
//! reused for a different kind of stream.

mod file;
mod memory;

pub use file::FileRevisionTracker;
pub use memory::MemoryRevisionTracker;

use crate::replication::{Revision, StreamCategory, StreamDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared store of per-stream resumption points
pub trait RevisionTracker: Send + Sync {
    /// Last processed revision; `None` means start from a full snapshot
    fn revision(&self, category: StreamCategory, stream: &str) -> Option<Revision>;

    /// Forget the stream's revision. Idempotent.
    fn reset(&self, stream: &str) -> Result<(), RevisionError>;

    /// Advance the stream's revision
    fn update(
        &self,
        category: StreamCategory,
        stream: &str,
        revision: Revision,
    ) -> Result<(), RevisionError>;
}

/// Revision store errors
#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error("revision store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("revision store format: {0}")]
    Format(#[from] serde_json::Error),
    #[error("revision store is no longer persisted: {0}")]
    Unpersisted(String),
}

/// Persisted key of a stream's revision
pub fn revision_key(stream: &StreamDescriptor) -> &str {
    &stream.name
}

/// Stored revision entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRevision {
    pub category: StreamCategory,
    pub revision: Revision,
}

/// In-memory table shared by the tracker implementations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionTable {
    entries: BTreeMap<String, StoredRevision>,
}

impl RevisionTable {
    pub fn get(&self, category: StreamCategory, stream: &str) -> Option<Revision> {
        match self.entries.get(stream) {
            Some(entry) if entry.category == category => Some(entry.revision),
            Some(entry) => {
                tracing::warn!(
                    stream,
                    stored = %entry.category,
                    requested = %category,
                    "Stored revision belongs to another stream category, ignoring"
                );
                None
            }
            None => None,
        }
    }

    /// Remove the entry, returning whether one existed
    pub fn reset(&mut self, stream: &str) -> bool {
        self.entries.remove(stream).is_some()
    }

    /// Store `revision` unless an equal or later one is already stored.
    /// Returns whether the table changed.
    pub fn advance(&mut self, category: StreamCategory, stream: &str, revision: Revision) -> bool {
        match self.entries.get_mut(stream) {
            Some(entry) if entry.category == category && entry.revision >= revision => false,
            Some(entry) => {
                *entry = StoredRevision { category, revision };
                true
            }
            None => {
                self.entries
                    .insert(stream.to_string(), StoredRevision { category, revision });
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredRevision)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
