//! The per-shard dataset map (§4.2): a byte-accounted, LRU/TTL-evicting
//! key/value store. Generic over the stored value so the same engine backs
//! both the primary (queryable `QFrame`) tier and the L2 (opaque bytes)
//! tier, per §4.5's "same `DatasetMap` contract, no query capability".
//!
//! Eviction order is delegated to `lru::LruCache`, which already maintains
//! recency order on every `get`/`put`. Byte accounting and TTL are layered
//! on top, since `lru::LruCache`'s own capacity is an item count, not a
//! byte budget.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

use qcache_common::error::{QError, QResult};

/// One cached value plus the bookkeeping §3 requires.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub creation_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
    pub access_count: u64,
    /// Fixed at insertion; never recomputed (§3).
    pub size_bytes: usize,
}

/// A byte-accounted LRU/TTL map. `max_age_secs == 0` means no TTL eviction.
pub struct DatasetMap<V> {
    entries: LruCache<String, CacheEntry<V>>,
    size: usize,
    max_size: usize,
    max_age_secs: u64,
}

impl<V> DatasetMap<V> {
    pub fn new(max_size: usize, max_age_secs: u64) -> Self {
        DatasetMap {
            entries: LruCache::unbounded(),
            size: 0,
            max_size,
            max_age_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes currently resident. Invariant: always equals the sum of
    /// every entry's `size_bytes`.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Peeks without promoting recency or touching access bookkeeping.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Reads a value without promoting recency or bumping access
    /// bookkeeping — used for lookups that are incidental to the caller's
    /// own operation (e.g. an `in`-subquery reading another dataset) rather
    /// than a cache access in their own right.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.peek(key).map(|entry| &entry.value)
    }

    /// Reads an entry, bumping `last_access_time`/`access_count` and
    /// promoting it to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry<V>> {
        let now = Utc::now();
        let entry = self.entries.get_mut(key)?;
        entry.last_access_time = now;
        entry.access_count += 1;
        Some(&*entry)
    }

    /// If `max_age_secs > 0` and the entry is older than that, deletes it
    /// and returns `true`. A no-op (returns `false`) otherwise, including
    /// when the key is absent.
    pub fn evict_if_too_old(&mut self, key: &str) -> bool {
        if self.max_age_secs == 0 {
            return false;
        }
        let Some(entry) = self.entries.peek(key) else {
            return false;
        };
        let age = Utc::now() - entry.creation_time;
        if age > Duration::seconds(self.max_age_secs as i64) {
            self.delete(key);
            true
        } else {
            false
        }
    }

    /// Replaces (or inserts) `key`. If a previous entry existed its size is
    /// subtracted before the new size is added, keeping `size` accurate
    /// without requiring a prior `ensure_free` call (callers are expected
    /// to have called `ensure_free` first to avoid transiently exceeding
    /// `max_size`).
    pub fn put(&mut self, key: String, value: V, size_bytes: usize) {
        let now = Utc::now();
        if let Some(old) = self.entries.pop(&key) {
            self.size -= old.size_bytes;
        }
        self.entries.put(
            key,
            CacheEntry {
                value,
                creation_time: now,
                last_access_time: now,
                access_count: 0,
                size_bytes,
            },
        );
        self.size += size_bytes;
    }

    /// Idempotent: deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(old) => {
                self.size -= old.size_bytes;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.size = 0;
    }

    /// Removes and returns the least-recently-used entry, if any, updating
    /// `size` accordingly. Exposed (rather than folded only into
    /// `ensure_free`) so callers that need to do something with the evicted
    /// value itself — the shard worker writes it through to L2 — can.
    pub fn pop_lru(&mut self) -> Option<(String, CacheEntry<V>)> {
        let popped = self.entries.pop_lru();
        if let Some((_, ref entry)) = popped {
            self.size -= entry.size_bytes;
        }
        popped
    }

    /// Guarantees `max_size - size >= n_bytes` on return by evicting the
    /// least-recently-used entries, one at a time, until there's room.
    /// Returns the age (time since creation) of each evicted entry, in
    /// eviction order — callers must not depend on any particular ordering
    /// beyond "eviction order" (§4.2 open question).
    ///
    /// Fails with `CapacityExceeded` if `n_bytes` alone can never fit.
    pub fn ensure_free(&mut self, n_bytes: usize) -> QResult<Vec<Duration>> {
        if n_bytes > self.max_size {
            return Err(QError::CapacityExceeded(n_bytes, self.max_size));
        }

        let mut evicted_ages = Vec::new();
        let now = Utc::now();
        while self.max_size - self.size < n_bytes {
            let Some((_, victim)) = self.entries.pop_lru() else {
                // Nothing left to evict but still not enough room: the
                // accounting is inconsistent with reality, which should
                // never happen given the invariant size == sum(sizes).
                break;
            };
            self.size -= victim.size_bytes;
            evicted_ages.push(now - victim.creation_time);
        }
        Ok(evicted_ages)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn put_get_delete_roundtrip() {
        let mut map: DatasetMap<Vec<u8>> = DatasetMap::new(1000, 0);
        map.put("a".to_string(), vec![1, 2, 3], 3);
        assert!(map.contains("a"));
        assert_eq!(map.size(), 3);
        let entry = map.get("a").unwrap();
        assert_eq!(entry.access_count, 1);

        assert!(map.delete("a"));
        assert!(!map.delete("a")); // idempotent
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn put_replaces_and_adjusts_size() {
        let mut map: DatasetMap<Vec<u8>> = DatasetMap::new(1000, 0);
        map.put("a".to_string(), vec![0; 10], 10);
        map.put("a".to_string(), vec![0; 4], 4);
        assert_eq!(map.size(), 4);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn ensure_free_fails_when_impossible() {
        let mut map: DatasetMap<()> = DatasetMap::new(100, 0);
        assert!(map.ensure_free(200).is_err());
    }

    #[test]
    fn ensure_free_evicts_lru_first() {
        let mut map: DatasetMap<()> = DatasetMap::new(10, 0);
        map.put("a".to_string(), (), 5);
        std::thread::sleep(std::time::Duration::from_millis(2));
        map.put("b".to_string(), (), 5);
        // touch "a" so it becomes MRU, "b" becomes LRU
        map.get("a");

        let evicted = map.ensure_free(5).unwrap();
        assert_eq!(evicted.len(), 1);
        assert!(map.contains("a"));
        assert!(!map.contains("b"));
    }

    #[test]
    fn ttl_expiry() {
        let mut map: DatasetMap<()> = DatasetMap::new(100, 0);
        map.max_age_secs = 0; // explicit: no TTL by default
        map.put("a".to_string(), (), 1);
        assert!(!map.evict_if_too_old("a"));

        let mut aged: DatasetMap<()> = DatasetMap::new(100, 0);
        aged.max_age_secs = 1;
        aged.put("a".to_string(), (), 1);
        // force the entry to look old without sleeping a full second in tests
        if let Some(entry) = aged.entries.peek_mut("a") {
            entry.creation_time = Utc::now() - Duration::seconds(2);
        }
        assert!(aged.evict_if_too_old("a"));
        assert!(!aged.contains("a"));
    }
}
