//! Cache Store Module
//!
//! Key-value storage with per-entry TTL, hit/miss counters and dirty tracking
//! for snapshot persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats};

/// Cache store shared between request handlers, the persistence manager and
/// background tasks. Every operation runs inside one critical section.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Snapshot ==
/// Consistent point-in-time copy of every live entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Mutation sequence number the copy was taken at
    pub seq: u64,
    /// Live entries, sorted by key
    pub entries: BTreeMap<String, Value>,
}

// == Cache Store ==
/// In-memory cache with TTL expiry and a dirty flag gating disk writes.
///
/// The dirty flag is derived from two counters: every mutation bumps
/// `mutation_seq`, a successful flush records the sequence it persisted in
/// `flushed_seq`. The store is dirty while the two differ.
#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
    /// Default TTL in seconds, 0 = entries never expire
    default_ttl: u64,
    mutation_seq: u64,
    flushed_seq: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `default_ttl` - TTL in seconds applied when `set` receives none (0 = never expire)
    pub fn new(default_ttl: u64) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            default_ttl,
            mutation_seq: 0,
            flushed_seq: 0,
        }
    }

    /// Wraps the store for sharing across tasks.
    pub fn shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns `None` on a miss or when the entry has expired; expired entries
    /// are dropped on the way out. Never raises the dirty flag.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.stats.record_hit();
                debug!(key, "cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        self.stats.record_miss();
        debug!(key, expired, "cache miss");
        None
    }

    // == Set ==
    /// Stores a value, overwriting any existing entry and resetting its TTL.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - TTL in seconds; `None` applies the default, `Some(0)` never expires
    pub fn set(&mut self, key: impl Into<String>, value: Value, ttl: Option<u64>) {
        let key = key.into();
        let ttl = self.effective_ttl(ttl);
        debug!(key = %key, ttl = ?ttl, "cache set");
        self.entries.insert(key, CacheEntry::new(value, ttl));
        self.mark_dirty();
    }

    // == Multi Set ==
    /// Stores many values under the default TTL policy.
    pub fn mset<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let ttl = self.effective_ttl(None);
        for (key, value) in entries {
            self.entries.insert(key, CacheEntry::new(value, ttl));
        }
        self.mark_dirty();
    }

    // == Delete ==
    /// Removes the given keys, returning how many entries existed.
    ///
    /// Raises the dirty flag only when something was actually removed.
    pub fn del<S: AsRef<str>>(&mut self, keys: &[S]) -> usize {
        let removed = keys
            .iter()
            .filter(|key| self.entries.remove(key.as_ref()).is_some())
            .count();

        if removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    // == Delete By Prefix ==
    /// Removes every entry whose key starts with `prefix`.
    ///
    /// Keys are collected first and then removed as one batch, all under the
    /// caller's exclusive borrow, so no reader sees a half-invalidated prefix.
    pub fn delete_all_matching_prefix(&mut self, prefix: &str) -> usize {
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        let removed = self.del(&matching);
        debug!(prefix, removed, "cache prefix invalidation");
        removed
    }

    // == Keys ==
    /// Returns every non-expired key.
    pub fn keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Snapshot ==
    /// Copies every non-expired entry, evaluated against a single clock reading.
    pub fn snapshot(&self) -> Snapshot {
        let now = current_timestamp_ms();
        let entries = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();

        Snapshot {
            seq: self.mutation_seq,
            entries,
        }
    }

    // == Dirty Tracking ==
    /// True iff a mutation happened since the last successful flush.
    pub fn is_dirty(&self) -> bool {
        self.mutation_seq != self.flushed_seq
    }

    /// Records that the snapshot taken at `seq` reached disk.
    ///
    /// Mutations made after that snapshot keep the store dirty.
    pub fn mark_flushed(&mut self, seq: u64) {
        if seq > self.flushed_seq {
            self.flushed_seq = seq.min(self.mutation_seq);
        }
    }

    fn mark_dirty(&mut self) {
        self.mutation_seq += 1;
    }

    fn effective_ttl(&self, ttl: Option<u64>) -> Option<u64> {
        match ttl.unwrap_or(self.default_ttl) {
            0 => None,
            seconds => Some(seconds),
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.dirty = self.is_dirty();
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Expired entries never appear in a snapshot, so the sweep leaves the
    /// dirty flag alone. Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
