//! In-memory backends.
//!
//! Same contracts as the file-backed classes, held entirely in memory.
//! Used for small working sets, tests, and as building blocks for the
//! restore path.

use super::{OrderedMap, OrderedStore, RecordStore};
use crate::comparator::KeyComparator;
use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;

/// Unordered in-memory store.
#[derive(Debug, Default)]
pub struct MemHashStore {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemHashStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemHashStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.map.remove(key).is_some())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.map.len() as u64)
    }

    fn clear(&mut self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        for (key, value) in &self.map {
            if !visit(key, value)? {
                break;
            }
        }
        Ok(())
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.map.keys().next().cloned())
    }

    fn sync(&mut self, _hard: bool) -> Result<()> {
        Ok(())
    }

    fn should_rebuild(&self) -> Result<bool> {
        Ok(false)
    }

    fn rebuild(&mut self) -> Result<()> {
        self.map.shrink_to_fit();
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
            ("count".into(), self.map.len().to_string()),
        ]
    }

    fn class_name(&self) -> &'static str {
        "memhash"
    }
}

/// Ordered in-memory store.
#[derive(Debug)]
pub struct MemTreeStore {
    map: OrderedMap,
}

impl MemTreeStore {
    /// Creates an empty store with the given comparator.
    #[must_use]
    pub fn new(cmp: KeyComparator) -> Self {
        Self {
            map: OrderedMap::new(cmp),
        }
    }
}

impl RecordStore for MemTreeStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.insert(key, value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.map.remove(key).is_some())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.map.len() as u64)
    }

    fn clear(&mut self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        for (key, value) in self.map.iter() {
            if !visit(key, value)? {
                break;
            }
        }
        Ok(())
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.map.lowest())
    }

    fn sync(&mut self, _hard: bool) -> Result<()> {
        Ok(())
    }

    fn should_rebuild(&self) -> Result<bool> {
        Ok(false)
    }

    fn rebuild(&mut self) -> Result<()> {
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
            ("count".into(), self.map.len().to_string()),
            ("key_comparator".into(), self.map.comparator().name().into()),
        ]
    }

    fn ordered(&self) -> Option<&dyn OrderedStore> {
        Some(self)
    }

    fn class_name(&self) -> &'static str {
        "memtree"
    }
}

impl OrderedStore for MemTreeStore {
    fn comparator(&self) -> KeyComparator {
        self.map.comparator()
    }

    fn lowest(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.map.lowest())
    }

    fn highest(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.map.highest())
    }

    fn upper_bound(&self, key: &[u8], inclusive: bool) -> Result<Option<Vec<u8>>> {
        Ok(self.map.upper_bound(key, inclusive))
    }

    fn lower_bound(&self, key: &[u8], inclusive: bool) -> Result<Option<Vec<u8>>> {
        Ok(self.map.lower_bound(key, inclusive))
    }
}
