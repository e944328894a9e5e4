//! Storage backends.
//!
//! Each backend implements [`RecordStore`], the common capability set the
//! facade dispatches to. Ordered backends additionally expose
//! [`OrderedStore`] through [`RecordStore::ordered`]; the cursor and the
//! range-scanning parts of the engine are built purely on that
//! capability.

use crate::comparator::{KeyComparator, OrderedKey};
use crate::config::OpenOptions;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

mod cache;
mod hash;
mod memory;
mod skip;
mod tree;

pub use cache::CacheStore;
pub use hash::HashStore;
pub use memory::{MemHashStore, MemTreeStore};
pub use skip::SkipStore;
pub use tree::TreeStore;

/// A concrete storage engine behind the facade.
///
/// All methods are invoked with the facade's locking already in place:
/// `&mut` methods run under the facade's exclusive backend lock, `&self`
/// methods under its shared lock. Backends therefore need no internal
/// record locking of their own.
pub trait RecordStore: Send + Sync {
    /// Returns the value for a key, or `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores a record, replacing any existing value.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a record. Returns `false` if the key was absent.
    fn remove(&mut self, key: &[u8]) -> Result<bool>;

    /// Returns the number of live records.
    fn count(&self) -> Result<u64>;

    /// Removes every record.
    fn clear(&mut self) -> Result<()>;

    /// Visits every record. The visitor returns `Ok(false)` to stop
    /// early. Enumeration order is the backend's natural order.
    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()>;

    /// Returns the enumeration-first key, or `None` when empty. For
    /// ordered backends this is the comparator minimum.
    fn first_key(&self) -> Result<Option<Vec<u8>>>;

    /// Flushes state to durable storage. `hard` additionally syncs file
    /// metadata to the device.
    fn sync(&mut self, hard: bool) -> Result<()>;

    /// Cheap heuristic: would a rebuild reclaim meaningful space or
    /// rebalance the structure? Never blocks writers.
    fn should_rebuild(&self) -> Result<bool>;

    /// Exclusive compaction pass. Logical content is unchanged.
    fn rebuild(&mut self) -> Result<()>;

    /// Rebuild honoring tuning overrides (currently `num_buckets` for
    /// the hash backend). Unknown keys are ignored.
    fn rebuild_with(&mut self, params: &std::collections::BTreeMap<String, String>) -> Result<()> {
        let _ = params;
        self.rebuild()
    }

    /// Whether the backend passed its integrity checks.
    fn is_healthy(&self) -> bool;

    /// On-disk size in bytes; 0 for purely in-memory backends.
    fn file_size(&self) -> Result<u64>;

    /// The backing file path, if any.
    fn path(&self) -> Option<&Path>;

    /// Implementation metadata as string pairs.
    fn inspect(&self) -> Vec<(String, String)>;

    /// The ordered capability, or `None` for unordered backends.
    fn ordered(&self) -> Option<&dyn OrderedStore> {
        None
    }

    /// The configuration name of this backend class.
    fn class_name(&self) -> &'static str;
}

/// Range-seek capability of ordered backends.
pub trait OrderedStore {
    /// The comparator defining this backend's key order.
    fn comparator(&self) -> KeyComparator;

    /// The comparator-minimum key.
    fn lowest(&self) -> Result<Option<Vec<u8>>>;

    /// The comparator-maximum key.
    fn highest(&self) -> Result<Option<Vec<u8>>>;

    /// The least key `>= target` (inclusive) or `> target` (exclusive).
    fn upper_bound(&self, key: &[u8], inclusive: bool) -> Result<Option<Vec<u8>>>;

    /// The greatest key `<= target` (inclusive) or `< target` (exclusive).
    fn lower_bound(&self, key: &[u8], inclusive: bool) -> Result<Option<Vec<u8>>>;
}

/// Opens the backend selected by the options.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when a file-backed class is opened
/// without a path, or any error the backend's own open reports.
pub fn open_backend(opts: &OpenOptions, path: Option<&Path>) -> Result<Box<dyn RecordStore>> {
    use crate::config::BackendClass;

    if opts.class.needs_path() && path.is_none() {
        return Err(Error::invalid_argument(format!(
            "backend class {} requires a file path",
            opts.class.name()
        )));
    }

    Ok(match opts.class {
        BackendClass::Hash => Box::new(HashStore::open(path.unwrap_or_else(|| Path::new("")), opts)?),
        BackendClass::Tree => Box::new(TreeStore::open(path.unwrap_or_else(|| Path::new("")), opts)?),
        BackendClass::Skip => Box::new(SkipStore::open(path.unwrap_or_else(|| Path::new("")), opts)?),
        BackendClass::MemHash => Box::new(MemHashStore::new()),
        BackendClass::MemTree => Box::new(MemTreeStore::new(opts.key_comparator)),
        BackendClass::Cache => Box::new(CacheStore::new(opts.cap_rec_num)),
    })
}

/// Comparator-keyed ordered map shared by the tree, skip, and in-memory
/// ordered backends.
#[derive(Debug)]
pub(crate) struct OrderedMap {
    map: BTreeMap<OrderedKey, Vec<u8>>,
    cmp: KeyComparator,
}

impl OrderedMap {
    pub(crate) fn new(cmp: KeyComparator) -> Self {
        Self {
            map: BTreeMap::new(),
            cmp,
        }
    }

    pub(crate) fn comparator(&self) -> KeyComparator {
        self.cmp
    }

    fn wrap(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.cmp)
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.map.get(&self.wrap(key))
    }

    pub(crate) fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Option<Vec<u8>> {
        self.map.insert(self.wrap(key), value)
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.remove(&self.wrap(key))
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.map.iter().map(|(k, v)| (k.bytes.as_slice(), v.as_slice()))
    }

    pub(crate) fn lowest(&self) -> Option<Vec<u8>> {
        self.map.keys().next().map(|k| k.bytes.clone())
    }

    pub(crate) fn highest(&self) -> Option<Vec<u8>> {
        self.map.keys().next_back().map(|k| k.bytes.clone())
    }

    pub(crate) fn upper_bound(&self, key: &[u8], inclusive: bool) -> Option<Vec<u8>> {
        let start = if inclusive {
            Bound::Included(self.wrap(key))
        } else {
            Bound::Excluded(self.wrap(key))
        };
        self.map
            .range((start, Bound::Unbounded))
            .next()
            .map(|(k, _)| k.bytes.clone())
    }

    pub(crate) fn lower_bound(&self, key: &[u8], inclusive: bool) -> Option<Vec<u8>> {
        let end = if inclusive {
            Bound::Included(self.wrap(key))
        } else {
            Bound::Excluded(self.wrap(key))
        };
        self.map
            .range((Bound::Unbounded, end))
            .next_back()
            .map(|(k, _)| k.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_map_bounds() {
        let mut map = OrderedMap::new(KeyComparator::Lexical);
        for key in [b"b".as_slice(), b"d", b"f"] {
            map.insert(key, b"v".to_vec());
        }

        assert_eq!(map.lowest(), Some(b"b".to_vec()));
        assert_eq!(map.highest(), Some(b"f".to_vec()));
        assert_eq!(map.upper_bound(b"d", true), Some(b"d".to_vec()));
        assert_eq!(map.upper_bound(b"d", false), Some(b"f".to_vec()));
        assert_eq!(map.upper_bound(b"c", true), Some(b"d".to_vec()));
        assert_eq!(map.lower_bound(b"d", true), Some(b"d".to_vec()));
        assert_eq!(map.lower_bound(b"d", false), Some(b"b".to_vec()));
        assert_eq!(map.upper_bound(b"f", false), None);
        assert_eq!(map.lower_bound(b"b", false), None);
    }

    #[test]
    fn ordered_map_honors_comparator() {
        let mut map = OrderedMap::new(KeyComparator::Decimal);
        for key in [b"10".as_slice(), b"9", b"100"] {
            map.insert(key, Vec::new());
        }
        let keys: Vec<&[u8]> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"9".as_slice(), b"10", b"100"]);
    }

    #[test]
    fn open_backend_requires_path_for_file_classes() {
        let opts = OpenOptions::default();
        let result = open_backend(&opts, None);
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }
}
