//! The L2 tier (spec §4.5): an optional second cache tier holding opaque,
//! already-serialized dataset bytes, backed by the same `DatasetMap`
//! contract as the primary (queryable) tier but with no query capability
//! of its own — a rehydration source for primary-tier misses.
//!
//! A zero-sized L2 (`l2_cache_size == 0`, the default, §5) disables it
//! entirely: every operation becomes a no-op / miss, and no bytes are ever
//! retained, matching the "opt-in tier" framing in the design notes.
//!
//! Statistics are threaded in explicitly by the caller (the shard worker)
//! rather than reached for through a global — the same explicit-parameter
//! discipline the query evaluator uses for ambient-frame lookups.

use qcache_common::error::QResult;
use qcache_datasetmap::DatasetMap;
use qcache_stats::Statistics;

pub struct L2Store {
    map: Option<DatasetMap<Vec<u8>>>,
}

impl L2Store {
    /// `max_size_bytes == 0` disables the tier entirely (§4.5, §5 default).
    pub fn new(max_size_bytes: usize) -> Self {
        L2Store {
            map: if max_size_bytes == 0 {
                None
            } else {
                Some(DatasetMap::new(max_size_bytes, 0))
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.map.is_some()
    }

    pub fn get(&mut self, key: &str, stats: &mut Statistics) -> Option<Vec<u8>> {
        let map = self.map.as_mut()?;
        match map.get(key) {
            Some(entry) => {
                stats.inc("l2_hit_count", 1);
                Some(entry.value.clone())
            }
            None => {
                stats.inc("l2_miss_count", 1);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.as_ref().is_some_and(|m| m.contains(key))
    }

    /// A no-op when the tier is disabled: callers don't need to branch on
    /// `is_enabled()` before inserting.
    pub fn put(&mut self, key: String, bytes: Vec<u8>, stats: &mut Statistics) -> QResult<()> {
        let Some(map) = self.map.as_mut() else {
            return Ok(());
        };
        let size = bytes.len();
        let replaced = map.contains(&key);
        let evicted_ages = map.ensure_free(size)?;
        for age in &evicted_ages {
            stats.append("l2_durations_until_eviction", age.num_milliseconds() as f64 / 1000.0);
        }
        stats.inc("l2_size_evict_count", evicted_ages.len() as i64);
        map.put(key, bytes, size);
        if replaced {
            stats.inc("l2_replace_count", 1);
        } else {
            stats.inc("l2_store_count", 1);
        }
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.map.as_mut().is_some_and(|m| m.delete(key))
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.map.as_ref().map(|m| m.size()).unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn disabled_by_default_size_is_a_pure_noop() {
        let mut l2 = L2Store::new(0);
        let mut stats = Statistics::new(100);
        assert!(!l2.is_enabled());
        l2.put("a".to_string(), vec![1, 2, 3], &mut stats).unwrap();
        assert!(l2.get("a", &mut stats).is_none());
        assert_eq!(l2.len(), 0);
    }

    #[test]
    fn put_get_roundtrip_and_stats() {
        let mut l2 = L2Store::new(1000);
        let mut stats = Statistics::new(100);
        l2.put("a".to_string(), vec![1, 2, 3], &mut stats).unwrap();
        assert_eq!(l2.get("a", &mut stats), Some(vec![1, 2, 3]));
        assert!(l2.get("missing", &mut stats).is_none());

        let snap = stats.snapshot();
        assert_eq!(snap["l2_store_count"], 1);
        assert_eq!(snap["l2_hit_count"], 1);
        assert_eq!(snap["l2_miss_count"], 1);
    }

    #[test]
    fn evicts_when_over_budget() {
        let mut l2 = L2Store::new(10);
        let mut stats = Statistics::new(100);
        l2.put("a".to_string(), vec![0; 6], &mut stats).unwrap();
        l2.put("b".to_string(), vec![0; 6], &mut stats).unwrap();
        assert!(!l2.contains("a"));
        assert!(l2.contains("b"));
    }
}
