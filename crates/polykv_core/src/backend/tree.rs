//! File-backed ordered backend.
//!
//! The whole tree is held in memory and persisted as a snapshot: a fixed
//! header followed by length-prefixed records in key order. The snapshot
//! is rewritten on `sync` and on close, so reads never touch the file
//! after open.

use super::{OrderedMap, OrderedStore, RecordStore};
use crate::comparator::KeyComparator;
use crate::config::OpenOptions;
use crate::error::{Error, Result};
use crate::wire::{self, SliceReader};
use polykv_storage::{FileStorage, StorageFile};
use std::path::{Path, PathBuf};
use tracing::debug;

const TREE_MAGIC: [u8; 4] = *b"PKT1";
const TREE_VERSION: u16 = 1;

/// Ordered store persisted as a whole-file snapshot.
#[derive(Debug)]
pub struct TreeStore {
    map: OrderedMap,
    storage: FileStorage,
    path: PathBuf,
    writable: bool,
    dirty: bool,
    healthy: bool,
}

impl TreeStore {
    /// Opens or creates a tree database file.
    ///
    /// An existing file's stored comparator wins over the requested one;
    /// the snapshot defines the order its keys were written in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] for a malformed snapshot, or the
    /// storage error from opening the file.
    pub fn open(path: &Path, opts: &OpenOptions) -> Result<Self> {
        let storage = if opts.writable {
            FileStorage::open_locked(path)?
        } else {
            FileStorage::open(path)?
        };

        let size = storage.size()?;
        let map = if size == 0 {
            OrderedMap::new(opts.key_comparator)
        } else {
            load_snapshot(&storage, size)?
        };

        debug!(path = %path.display(), records = map.len(), "opened tree database");
        Ok(Self {
            map,
            storage,
            path: path.to_path_buf(),
            writable: opts.writable,
            dirty: false,
            healthy: true,
        })
    }

    fn write_snapshot(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TREE_MAGIC);
        buf.extend_from_slice(&TREE_VERSION.to_le_bytes());
        buf.push(self.map.comparator().as_byte());
        buf.push(0);
        buf.extend_from_slice(&(self.map.len() as u64).to_le_bytes());
        for (key, value) in self.map.iter() {
            wire::put_frame(&mut buf, key, value);
        }

        self.storage.truncate(0)?;
        self.storage.append(&buf)?;
        self.storage.flush()?;
        self.dirty = false;
        Ok(())
    }
}

fn load_snapshot(storage: &FileStorage, size: u64) -> Result<OrderedMap> {
    let data = storage.read_vec(0, size as usize)?;
    let mut reader = SliceReader::new(&data);

    let magic = reader.read_bytes(4)?;
    if magic != TREE_MAGIC {
        return Err(Error::corruption("bad tree file magic"));
    }
    let version = reader.read_u16()?;
    if version != TREE_VERSION {
        return Err(Error::corruption(format!(
            "unsupported tree file version {version}"
        )));
    }
    let cmp_byte = reader.read_u8()?;
    let cmp = KeyComparator::from_byte(cmp_byte)
        .ok_or_else(|| Error::corruption(format!("unknown comparator code {cmp_byte}")))?;
    reader.read_u8()?;
    let count = reader.read_u64()?;

    let mut map = OrderedMap::new(cmp);
    for _ in 0..count {
        let (key, value) = wire::read_frame(&mut reader)?;
        map.insert(&key, value);
    }
    if reader.remaining() != 0 {
        return Err(Error::corruption("trailing bytes after tree snapshot"));
    }
    Ok(map)
}

impl RecordStore for TreeStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.insert(key, value.to_vec());
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        let removed = self.map.remove(key).is_some();
        self.dirty |= removed;
        Ok(removed)
    }

    fn count(&self) -> Result<u64> {
        Ok(self.map.len() as u64)
    }

    fn clear(&mut self) -> Result<()> {
        self.map.clear();
        self.dirty = true;
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

    fn sync(&mut self, hard: bool) -> Result<()> {
        if self.dirty {
            self.write_snapshot()?;
        }
        if hard {
            self.storage.sync()?;
        }
        Ok(())
    }

    fn should_rebuild(&self) -> Result<bool> {
        // Snapshots are rewritten whole, so there is no garbage to
        // reclaim between syncs.
        Ok(false)
    }

    fn rebuild(&mut self) -> Result<()> {
        self.write_snapshot()?;
        self.storage.sync()?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn file_size(&self) -> Result<u64> {
        Ok(self.storage.size()?)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn inspect(&self) -> Vec<(String, String)> {
        vec![
            ("class".into(), self.class_name().into()),
            ("count".into(), self.map.len().to_string()),
            ("key_comparator".into(), self.map.comparator().name().into()),
            (
                "file_size".into(),
                self.storage.size().unwrap_or_default().to_string(),
            ),
        ]
    }

    fn ordered(&self) -> Option<&dyn OrderedStore> {
        Some(self)
    }

    fn class_name(&self) -> &'static str {
        "tree"
    }
}

impl OrderedStore for TreeStore {
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

impl Drop for TreeStore {
    fn drop(&mut self) {
        if self.writable && self.dirty {
            let _ = self.write_snapshot();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn writable_opts() -> OpenOptions {
        OpenOptions::default().writable(true)
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkt");

        {
            let mut store = TreeStore::open(&path, &writable_opts()).unwrap();
            store.set(b"b", b"2").unwrap();
            store.set(b"a", b"1").unwrap();
            store.sync(true).unwrap();
        }

        let store = TreeStore::open(&path, &writable_opts()).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.first_key().unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn snapshot_written_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkt");

        {
            let mut store = TreeStore::open(&path, &writable_opts()).unwrap();
            store.set(b"k", b"v").unwrap();
            // No explicit sync.
        }

        let store = TreeStore::open(&path, &writable_opts()).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn stored_comparator_wins_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkt");

        {
            let opts = writable_opts().key_comparator(KeyComparator::Decimal);
            let mut store = TreeStore::open(&path, &opts).unwrap();
            store.set(b"10", b"").unwrap();
            store.set(b"9", b"").unwrap();
            store.sync(false).unwrap();
        }

        // Reopen without asking for the decimal order.
        let store = TreeStore::open(&path, &writable_opts()).unwrap();
        assert_eq!(store.first_key().unwrap(), Some(b"9".to_vec()));
    }

    #[test]
    fn rejects_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkt");
        std::fs::write(&path, b"not a tree file at all").unwrap();

        let err = TreeStore::open(&path, &writable_opts()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn range_seeks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkt");

        let mut store = TreeStore::open(&path, &writable_opts()).unwrap();
        for key in [b"b".as_slice(), b"d", b"f"] {
            store.set(key, b"v").unwrap();
        }
        let ordered = store.ordered().unwrap();
        assert_eq!(ordered.upper_bound(b"c", true).unwrap(), Some(b"d".to_vec()));
        assert_eq!(ordered.lower_bound(b"e", true).unwrap(), Some(b"d".to_vec()));
        assert_eq!(ordered.highest().unwrap(), Some(b"f".to_vec()));
    }
}
