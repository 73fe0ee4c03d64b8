//! Incrementally built reference-data store
//!
//! A repository is fed by snapshot batches. Merging is last-write-wins per
//! key and never deletes: ids absent from a later batch stay known.

use std::collections::hash_map::{self, HashMap};
use std::hash::Hash;

/// A record that knows its own repository key
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;
}

/// Outcome of merging one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Keys seen for the first time
    pub inserted: usize,
    /// Keys whose record was overwritten
    pub replaced: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Keyed store built from snapshot batches
#[derive(Debug, Clone)]
pub struct Repository<K, V> {
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for Repository<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq + Hash, V> Repository<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up a record; `None` means the id was never delivered
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.entries.iter()
    }
}

impl<K, V> Repository<K, V>
where
    K: Eq + Hash + Clone,
    V: Keyed<Key = K>,
{
    /// Build a repository from a single batch
    pub fn from_batch<I: IntoIterator<Item = V>>(batch: I) -> Self {
        let mut repository = Self::new();
        repository.merge(batch);
        repository
    }

    /// Merge a batch in delivery order
    pub fn merge<I: IntoIterator<Item = V>>(&mut self, batch: I) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for record in batch {
            match self.entries.insert(record.key(), record) {
                Some(_) => summary.replaced += 1,
                None => summary.inserted += 1,
            }
        }
        summary
    }

    /// Consuming form of `merge`
    pub fn merged<I: IntoIterator<Item = V>>(mut self, batch: I) -> Self {
        self.merge(batch);
        self
    }
}

impl<K: Eq + Hash, V> Default for Repository<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
