//! Bounded in-memory cache backend.

use super::RecordStore;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Least-recently-used bookkeeping. Ticks are monotonically increasing;
/// the record with the smallest tick is the eviction candidate.
#[derive(Debug, Default)]
struct Recency {
    tick: u64,
    by_key: HashMap<Vec<u8>, u64>,
    by_tick: BTreeMap<u64, Vec<u8>>,
}

impl Recency {
    fn touch(&mut self, key: &[u8]) {
        if let Some(old) = self.by_key.get(key).copied() {
            self.by_tick.remove(&old);
        }
        self.tick += 1;
        self.by_key.insert(key.to_vec(), self.tick);
        self.by_tick.insert(self.tick, key.to_vec());
    }

    fn forget(&mut self, key: &[u8]) {
        if let Some(tick) = self.by_key.remove(key) {
            self.by_tick.remove(&tick);
        }
    }

    fn oldest(&self) -> Option<Vec<u8>> {
        self.by_tick.values().next().cloned()
    }

    fn clear(&mut self) {
        self.by_key.clear();
        self.by_tick.clear();
    }
}

/// In-memory store bounded to `cap_rec_num` records.
///
/// When an insertion pushes the record count past the bound, the least
/// recently used records are evicted. Reads count as use. A capacity of
/// zero means unbounded.
#[derive(Debug)]
pub struct CacheStore {
    data: HashMap<Vec<u8>, Vec<u8>>,
    recency: Mutex<Recency>,
    capacity: u64,
}

impl CacheStore {
    /// Creates an empty store bounded to `capacity` records (0 = unbounded).
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            data: HashMap::new(),
            recency: Mutex::new(Recency::default()),
            capacity,
        }
    }

    fn evict_over_capacity(&mut self) {
        if self.capacity == 0 {
            return;
        }
        while self.data.len() as u64 > self.capacity {
            let mut recency = self.recency.lock();
            let Some(victim) = recency.oldest() else {
                break;
            };
            recency.forget(&victim);
            drop(recency);
            self.data.remove(&victim);
        }
    }
}

impl RecordStore for CacheStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.data.get(key).cloned();
        if value.is_some() {
            self.recency.lock().touch(key);
        }
        Ok(value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        self.recency.lock().touch(key);
        self.evict_over_capacity();
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        let removed = self.data.remove(key).is_some();
        if removed {
            self.recency.lock().forget(key);
        }
        Ok(removed)
    }

    fn count(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn clear(&mut self) -> Result<()> {
        self.data.clear();
        self.recency.lock().clear();
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        for (key, value) in &self.data {
            if !visit(key, value)? {
                break;
            }
        }
        Ok(())
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.data.keys().next().cloned())
    }

    fn sync(&mut self, _hard: bool) -> Result<()> {
        Ok(())
    }

    fn should_rebuild(&self) -> Result<bool> {
        Ok(false)
    }

    fn rebuild(&mut self) -> Result<()> {
        self.data.shrink_to_fit();
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn file_size(&self) -> Result<u64> {
        Ok(0)
    }

    fn path(&self) -> Option<&Path> {
        None
    }

    fn inspect(&self) -> Vec<(String, String)> {
        vec![
            ("class".into(), self.class_name().into()),
            ("count".into(), self.data.len().to_string()),
            ("cap_rec_num".into(), self.capacity.to_string()),
        ]
    }

    fn class_name(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut store = CacheStore::new(2);
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();

        // Touch "a" so "b" becomes the eviction candidate.
        store.get(b"a").unwrap();
        store.set(b"c", b"3").unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), None);
        assert_eq!(store.get(b"c").unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let mut store = CacheStore::new(0);
        for i in 0..100u32 {
            store.set(&i.to_be_bytes(), b"v").unwrap();
        }
        assert_eq!(store.count().unwrap(), 100);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut store = CacheStore::new(2);
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();
        store.set(b"a", b"changed").unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get(b"a").unwrap(), Some(b"changed".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }
}
