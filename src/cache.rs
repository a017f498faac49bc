//! Last-known-good value cache.
//!
//! Entries are written only by a successful guarded fetch and are never
//! evicted; the key space is expected to be bounded by the caller's domain.

use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::RwLock;

/// A cached value and the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    /// The last successfully fetched value.
    pub value: V,
    /// When `value` was fetched.
    pub fetched_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

/// Thread-safe map from key to the last successfully fetched value.
///
/// A reader sees either the previous entry or the complete new one.
pub struct StaleCache<K, V> {
    entries: RwLock<AHashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for StaleCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
        }
    }
}

impl<K, V> StaleCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `key` unless the cached entry was fetched later.
    ///
    /// Racing fetches of one key may finish out of order; the newest value
    /// wins regardless of which insert runs last.
    pub(crate) fn insert(&self, key: K, value: V, fetched_at: Instant) {
        let entry = CacheEntry { value, fetched_at };
        match self.entries.write().entry(key) {
            Entry::Occupied(mut slot) => {
                if slot.get().fetched_at <= fetched_at {
                    slot.insert(entry);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
    }

    /// Returns a copy of the entry for `key`.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Returns true if `key` has ever been fetched successfully.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The cached keys, in no particular order.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.read().keys().cloned().collect()
    }
}
