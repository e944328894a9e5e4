//! File-backed ordered backend tuned for bulk loads.
//!
//! Mutations are appended to the file as log entries and replayed into an
//! in-memory ordered map at open. `sync` compacts the log down to one
//! `set` entry per live record, so the intended usage pattern - a burst
//! of sorted writes followed by read-mostly access - pays the rewrite
//! cost once.

use super::{OrderedMap, OrderedStore, RecordStore};
use crate::comparator::KeyComparator;
use crate::config::OpenOptions;
use crate::error::{Error, Result};
use crate::wire::{self, SliceReader};
use polykv_storage::{FileStorage, StorageFile};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SKIP_MAGIC: [u8; 4] = *b"PKS1";
const SKIP_VERSION: u16 = 1;
const HEADER_SIZE: u64 = 8;

const OP_SET: u8 = 1;
const OP_REMOVE: u8 = 2;
const OP_CLEAR: u8 = 3;

/// Ordered store persisted as an append-only mutation log.
#[derive(Debug)]
pub struct SkipStore {
    map: OrderedMap,
    storage: FileStorage,
    path: PathBuf,
    /// Log entries appended since the last compaction.
    tail_entries: u64,
    healthy: bool,
}

impl SkipStore {
    /// Opens or creates a skip database file.
    ///
    /// A torn final entry, the signature of a crashed writer, is dropped
    /// with a warning; everything before it is kept. Any other malformed
    /// content fails with [`Error::Corruption`].
    pub fn open(path: &Path, opts: &OpenOptions) -> Result<Self> {
        let storage = if opts.writable {
            FileStorage::open_locked(path)?
        } else {
            FileStorage::open(path)?
        };

        let size = storage.size()?;
        let mut healthy = true;
        let (map, tail_entries) = if size == 0 {
            if opts.writable {
                write_header(&storage, opts.key_comparator)?;
            }
            (OrderedMap::new(opts.key_comparator), 0)
        } else {
            let data = storage.read_vec(0, size as usize)?;
            let (map, tail_entries, good_len) = replay_log(&data)?;
            if (good_len as u64) < size {
                warn!(
                    path = %path.display(),
                    dropped = size - good_len as u64,
                    "dropping torn tail entry from skip log"
                );
                healthy = false;
                if opts.writable {
                    storage.truncate(good_len as u64)?;
                    healthy = true;
                }
            }
            (map, tail_entries)
        };

        debug!(path = %path.display(), records = map.len(), "opened skip database");
        Ok(Self {
            map,
            storage,
            path: path.to_path_buf(),
            tail_entries,
            healthy,
        })
    }

    fn append_entry(&mut self, op: u8, key: &[u8], value: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(9 + key.len() + value.len());
        buf.push(op);
        wire::put_frame(&mut buf, key, value);
        self.storage.append(&buf)?;
        self.tail_entries += 1;
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        for (key, value) in self.map.iter() {
            buf.push(OP_SET);
            wire::put_frame(&mut buf, key, value);
        }
        self.storage.truncate(0)?;
        write_header(&self.storage, self.map.comparator())?;
        self.storage.append(&buf)?;
        self.tail_entries = 0;
        Ok(())
    }
}

fn write_header(storage: &FileStorage, cmp: KeyComparator) -> Result<()> {
    let mut header = Vec::with_capacity(HEADER_SIZE as usize);
    header.extend_from_slice(&SKIP_MAGIC);
    header.extend_from_slice(&SKIP_VERSION.to_le_bytes());
    header.push(cmp.as_byte());
    header.push(0);
    storage.append(&header)?;
    Ok(())
}

/// Replays the log, returning the map, the entry count, and the byte
/// length of the longest well-formed prefix.
fn replay_log(data: &[u8]) -> Result<(OrderedMap, u64, usize)> {
    let mut reader = SliceReader::new(data);
    let magic = reader.read_bytes(4)?;
    if magic != SKIP_MAGIC {
        return Err(Error::corruption("bad skip file magic"));
    }
    let version = reader.read_u16()?;
    if version != SKIP_VERSION {
        return Err(Error::corruption(format!(
            "unsupported skip file version {version}"
        )));
    }
    let cmp_byte = reader.read_u8()?;
    let cmp = KeyComparator::from_byte(cmp_byte)
        .ok_or_else(|| Error::corruption(format!("unknown comparator code {cmp_byte}")))?;
    reader.read_u8()?;

    let mut map = OrderedMap::new(cmp);
    let mut entries = 0u64;
    let mut good_len = reader.position();
    while reader.remaining() > 0 {
        let entry = (|| -> Result<()> {
            let op = reader.read_u8()?;
            let (key, value) = wire::read_frame(&mut reader)?;
            match op {
                OP_SET => {
                    map.insert(&key, value);
                }
                OP_REMOVE => {
                    map.remove(&key);
                }
                OP_CLEAR => map.clear(),
                other => return Err(Error::corruption(format!("unknown log op {other}"))),
            }
            Ok(())
        })();
        match entry {
            Ok(()) => {
                entries += 1;
                good_len = reader.position();
            }
            // A short read at the tail is a torn append; report how far
            // the well-formed prefix goes and let the caller decide.
            Err(_) => break,
        }
    }
    Ok((map, entries, good_len))
}

impl RecordStore for SkipStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.insert(key, value.to_vec());
        self.append_entry(OP_SET, key, value)
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        if self.map.remove(key).is_none() {
            return Ok(false);
        }
        self.append_entry(OP_REMOVE, key, b"")?;
        Ok(true)
    }

    fn count(&self) -> Result<u64> {
        Ok(self.map.len() as u64)
    }

    fn clear(&mut self) -> Result<()> {
        self.map.clear();
        self.storage.truncate(HEADER_SIZE)?;
        self.tail_entries = 0;
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
        if self.tail_entries > self.map.len() as u64 {
            self.compact()?;
        }
        self.storage.flush()?;
        if hard {
            self.storage.sync()?;
        }
        Ok(())
    }

    fn should_rebuild(&self) -> Result<bool> {
        // Superseded entries outnumbering live records means replay work
        // and dead bytes worth reclaiming.
        Ok(self.tail_entries > self.map.len() as u64)
    }

    fn rebuild(&mut self) -> Result<()> {
        self.compact()?;
        self.storage.sync()?;
        self.healthy = true;
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
            ("tail_entries".into(), self.tail_entries.to_string()),
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
        "skip"
    }
}

impl OrderedStore for SkipStore {
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
