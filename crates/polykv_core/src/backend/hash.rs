//! File-backed hash table backend. The default class.
//!
//! # File layout
//!
//! ```text
//! [ 64-byte header ]
//! [ bucket table: num_buckets x u64 record offset, 0 = empty ]
//! [ records, each aligned to 2^align_pow bytes ]
//! ```
//!
//! A record is `[next: u64][klen: u32][vlen: u32][status: u8][key][value]`
//! padded to the alignment. Buckets chain through `next`; updates append
//! a fresh record, repoint the bucket head, and tombstone the old one.
//! Dead bytes accumulate until [`RecordStore::rebuild`] rewrites the file
//! through a temporary sibling.

use super::RecordStore;
use crate::config::{self, Compression, OpenOptions};
use crate::error::{Error, Result};
use crate::locks::fnv1a64;
use polykv_storage::{FileStorage, StorageFile};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HASH_MAGIC: [u8; 4] = *b"PKH1";
const HASH_VERSION: u16 = 1;
const HEADER_SIZE: u64 = 64;
const RECORD_HEADER_SIZE: u64 = 17;

const FLAG_DIRTY: u8 = 1;

const STATUS_DEAD: u8 = 0;
const STATUS_LIVE: u8 = 1;

// Header field offsets.
const OFF_VERSION: u64 = 4;
const OFF_FLAGS: u64 = 6;
const OFF_ALIGN_POW: u64 = 7;
const OFF_COMPRESSION: u64 = 8;
const OFF_NUM_BUCKETS: u64 = 16;
const OFF_COUNT: u64 = 24;
const OFF_DEAD_BYTES: u64 = 32;

/// On-disk hash table store.
#[derive(Debug)]
pub struct HashStore {
    storage: FileStorage,
    path: PathBuf,
    writable: bool,
    num_buckets: u64,
    align_pow: u8,
    compression: Compression,
    count: u64,
    dead_bytes: u64,
    header_dirty: bool,
    healthy: bool,
}

struct RecordHeader {
    next: u64,
    klen: u32,
    vlen: u32,
    status: u8,
}

struct FoundRecord {
    offset: u64,
    total_len: u64,
}

fn align_up(offset: u64, align_pow: u8) -> u64 {
    let align = 1u64 << align_pow;
    (offset + align - 1) & !(align - 1)
}

impl HashStore {
    /// Opens or creates a hash database file.
    ///
    /// When an existing file's dirty flag is set, the writer that last
    /// had it open never synced; the record counters are recomputed by a
    /// full scan and the store reports unhealthy until it is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for out-of-range tuning,
    /// [`Error::Corruption`] for a malformed header, or the storage
    /// error from opening the file.
    pub fn open(path: &Path, opts: &OpenOptions) -> Result<Self> {
        config::check_hash_tuning(opts.num_buckets, opts.align_pow)?;
        let storage = if opts.writable {
            FileStorage::open_locked(path)?
        } else {
            FileStorage::open(path)?
        };

        let mut store = Self {
            storage,
            path: path.to_path_buf(),
            writable: opts.writable,
            num_buckets: opts.num_buckets.max(1),
            align_pow: opts.align_pow,
            compression: opts.record_compression,
            count: 0,
            dead_bytes: 0,
            header_dirty: false,
            healthy: true,
        };

        if store.storage.size()? == 0 {
            if opts.writable {
                store.init_file()?;
            }
        } else {
            store.load_header()?;
        }

        debug!(
            path = %path.display(),
            buckets = store.num_buckets,
            count = store.count,
            "opened hash database"
        );
        Ok(store)
    }

    fn init_file(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.records_start() as usize];
        buf[0..4].copy_from_slice(&HASH_MAGIC);
        buf[OFF_VERSION as usize..OFF_VERSION as usize + 2]
            .copy_from_slice(&HASH_VERSION.to_le_bytes());
        buf[OFF_ALIGN_POW as usize] = self.align_pow;
        buf[OFF_COMPRESSION as usize] = match self.compression {
            Compression::None => 0,
            Compression::Zlib => 1,
        };
        buf[OFF_NUM_BUCKETS as usize..OFF_NUM_BUCKETS as usize + 8]
            .copy_from_slice(&self.num_buckets.to_le_bytes());
        self.storage.append(&buf)?;
        self.storage.flush()?;
        self.count = 0;
        self.dead_bytes = 0;
        self.header_dirty = false;
        Ok(())
    }

    fn load_header(&mut self) -> Result<()> {
        let header = self.storage.read_vec(0, HEADER_SIZE as usize).map_err(|_| {
            Error::corruption("hash file shorter than its header")
        })?;
        if header[0..4] != HASH_MAGIC {
            return Err(Error::corruption("bad hash file magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != HASH_VERSION {
            return Err(Error::corruption(format!(
                "unsupported hash file version {version}"
            )));
        }
        self.align_pow = header[OFF_ALIGN_POW as usize];
        if self.align_pow > config::MAX_ALIGN_POW {
            return Err(Error::corruption(format!(
                "implausible align_pow {} in header",
                self.align_pow
            )));
        }
        self.compression = match header[OFF_COMPRESSION as usize] {
            0 => Compression::None,
            1 => Compression::Zlib,
            other => {
                return Err(Error::corruption(format!(
                    "unknown compression code {other}"
                )))
            }
        };
        let mut u64_at = |off: u64| {
            let bytes: [u8; 8] = header[off as usize..off as usize + 8]
                .try_into()
                .unwrap_or([0; 8]);
            u64::from_le_bytes(bytes)
        };
        self.num_buckets = u64_at(OFF_NUM_BUCKETS).max(1);
        if self.num_buckets > config::MAX_NUM_BUCKETS {
            return Err(Error::corruption(format!(
                "implausible bucket count {} in header",
                self.num_buckets
            )));
        }
        self.count = u64_at(OFF_COUNT);
        self.dead_bytes = u64_at(OFF_DEAD_BYTES);

        if header[OFF_FLAGS as usize] & FLAG_DIRTY != 0 {
            warn!(path = %self.path.display(), "hash file was not closed cleanly");
            self.recompute_counters();
            self.healthy = false;
        }
        Ok(())
    }

    /// Recounts live and dead records by scanning the record region.
    /// Stops at the first torn record.
    fn recompute_counters(&mut self) {
        let mut count = 0u64;
        let mut dead_bytes = 0u64;
        let mut offset = self.records_start();
        let size = self.storage.size().unwrap_or(0);
        while offset + RECORD_HEADER_SIZE <= size {
            let Ok(header) = self.read_record_header(offset) else {
                break;
            };
            let total = self.record_len(header.klen, header.vlen);
            if offset + total > size {
                break;
            }
            if header.status == STATUS_LIVE {
                count += 1;
            } else {
                dead_bytes += total;
            }
            offset += total;
        }
        self.count = count;
        self.dead_bytes = dead_bytes;
    }

    fn records_start(&self) -> u64 {
        align_up(HEADER_SIZE + self.num_buckets * 8, self.align_pow)
    }

    fn record_len(&self, klen: u32, vlen: u32) -> u64 {
        align_up(
            RECORD_HEADER_SIZE + u64::from(klen) + u64::from(vlen),
            self.align_pow,
        )
    }

    fn slot_offset(&self, bucket: u64) -> u64 {
        HEADER_SIZE + bucket * 8
    }

    fn bucket_of(&self, key: &[u8]) -> u64 {
        fnv1a64(key) % self.num_buckets
    }

    fn read_slot(&self, bucket: u64) -> Result<u64> {
        let offset = self.slot_offset(bucket);
        if offset + 8 > self.storage.size()? {
            return Ok(0);
        }
        let bytes = self.storage.read_vec(offset, 8)?;
        let array: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::corruption("short bucket slot"))?;
        Ok(u64::from_le_bytes(array))
    }

    fn write_slot(&self, bucket: u64, record_offset: u64) -> Result<()> {
        self.storage
            .write_at(self.slot_offset(bucket), &record_offset.to_le_bytes())?;
        Ok(())
    }

    fn read_record_header(&self, offset: u64) -> Result<RecordHeader> {
        let bytes = self.storage.read_vec(offset, RECORD_HEADER_SIZE as usize)?;
        let next = u64::from_le_bytes(
            bytes[0..8]
                .try_into()
                .map_err(|_| Error::corruption("short record header"))?,
        );
        let klen = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let vlen = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let status = bytes[16];
        Ok(RecordHeader {
            next,
            klen,
            vlen,
            status,
        })
    }

    /// Walks the bucket chain for `key`, returning the live match if any.
    fn find(&self, key: &[u8]) -> Result<Option<FoundRecord>> {
        let mut offset = self.read_slot(self.bucket_of(key))?;
        while offset != 0 {
            let header = self.read_record_header(offset)?;
            if header.status == STATUS_LIVE && header.klen as usize == key.len() {
                let stored_key = self
                    .storage
                    .read_vec(offset + RECORD_HEADER_SIZE, header.klen as usize)?;
                if stored_key == key {
                    return Ok(Some(FoundRecord {
                        offset,
                        total_len: self.record_len(header.klen, header.vlen),
                    }));
                }
            }
            offset = header.next;
        }
        Ok(None)
    }

    fn read_value_at(&self, offset: u64) -> Result<Vec<u8>> {
        let header = self.read_record_header(offset)?;
        let stored = self.storage.read_vec(
            offset + RECORD_HEADER_SIZE + u64::from(header.klen),
            header.vlen as usize,
        )?;
        self.decode_value(&stored)
    }

    fn encode_value(&self, value: &[u8]) -> Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(value.to_vec()),
            Compression::Zlib => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(value)?;
                Ok(encoder.finish()?)
            }
        }
    }

    fn decode_value(&self, stored: &[u8]) -> Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(stored.to_vec()),
            Compression::Zlib => {
                let mut decoder = flate2::read::ZlibDecoder::new(stored);
                let mut value = Vec::new();
                decoder
                    .read_to_end(&mut value)
                    .map_err(|e| Error::corruption(format!("zlib decode failed: {e}")))?;
                Ok(value)
            }
        }
    }

    fn mark_dirty(&mut self) -> Result<()> {
        if !self.header_dirty {
            self.storage.write_at(OFF_FLAGS, &[FLAG_DIRTY])?;
            self.header_dirty = true;
        }
        Ok(())
    }

    fn write_counters(&mut self) -> Result<()> {
        self.storage
            .write_at(OFF_COUNT, &self.count.to_le_bytes())?;
        self.storage
            .write_at(OFF_DEAD_BYTES, &self.dead_bytes.to_le_bytes())?;
        self.storage.write_at(OFF_FLAGS, &[0])?;
        self.header_dirty = false;
        Ok(())
    }

    fn rebuild_into(&mut self, num_buckets: u64, align_pow: u8) -> Result<()> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".rebuild");
        let tmp_path = PathBuf::from(tmp_path);
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }

        let tmp_opts = OpenOptions::default()
            .writable(true)
            .num_buckets(num_buckets)
            .align_pow(align_pow)
            .record_compression(self.compression);
        {
            let mut tmp = Self::open(&tmp_path, &tmp_opts)?;
            self.for_each(&mut |key, value| {
                tmp.set(key, value)?;
                Ok(true)
            })?;
            tmp.sync(true)?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        self.storage = FileStorage::open_locked(&self.path)?;
        self.num_buckets = num_buckets;
        self.align_pow = align_pow;
        self.header_dirty = false;
        self.load_header()?;
        self.healthy = true;
        debug!(path = %self.path.display(), buckets = num_buckets, "rebuilt hash database");
        Ok(())
    }
}

impl RecordStore for HashStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.find(key)? {
            Some(found) => Ok(Some(self.read_value_at(found.offset)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.mark_dirty()?;
        let bucket = self.bucket_of(key);
        let head = self.read_slot(bucket)?;
        let existing = self.find(key)?;

        let stored = self.encode_value(value)?;
        let body_len = RECORD_HEADER_SIZE as usize + key.len() + stored.len();
        let mut buf = Vec::with_capacity(align_up(body_len as u64, self.align_pow) as usize);
        buf.extend_from_slice(&head.to_le_bytes());
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(stored.len() as u32).to_le_bytes());
        buf.push(STATUS_LIVE);
        buf.extend_from_slice(key);
        buf.extend_from_slice(&stored);
        buf.resize(align_up(body_len as u64, self.align_pow) as usize, 0);

        let new_offset = self.storage.append(&buf)?;
        self.write_slot(bucket, new_offset)?;

        if let Some(old) = existing {
            self.storage
                .write_at(old.offset + RECORD_HEADER_SIZE - 1, &[STATUS_DEAD])?;
            self.dead_bytes += old.total_len;
        } else {
            self.count += 1;
        }
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<bool> {
        let Some(found) = self.find(key)? else {
            return Ok(false);
        };
        self.mark_dirty()?;
        self.storage
            .write_at(found.offset + RECORD_HEADER_SIZE - 1, &[STATUS_DEAD])?;
        self.dead_bytes += found.total_len;
        self.count -= 1;
        Ok(true)
    }

    fn count(&self) -> Result<u64> {
        Ok(self.count)
    }

    fn clear(&mut self) -> Result<()> {
        self.storage.truncate(0)?;
        self.init_file()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        let size = self.storage.size()?;
        let mut offset = self.records_start();
        while offset + RECORD_HEADER_SIZE <= size {
            let header = self.read_record_header(offset)?;
            let total = self.record_len(header.klen, header.vlen);
            if offset + total > size {
                return Err(Error::corruption("record extends past end of file"));
            }
            if header.status == STATUS_LIVE {
                let key = self
                    .storage
                    .read_vec(offset + RECORD_HEADER_SIZE, header.klen as usize)?;
                let stored = self.storage.read_vec(
                    offset + RECORD_HEADER_SIZE + u64::from(header.klen),
                    header.vlen as usize,
                )?;
                let value = self.decode_value(&stored)?;
                if !visit(&key, &value)? {
                    break;
                }
            }
            offset += total;
        }
        Ok(())
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>> {
        let mut first = None;
        self.for_each(&mut |key, _| {
            first = Some(key.to_vec());
            Ok(false)
        })?;
        Ok(first)
    }

    fn sync(&mut self, hard: bool) -> Result<()> {
        self.write_counters()?;
        self.storage.flush()?;
        if hard {
            self.storage.sync()?;
        }
        Ok(())
    }

    fn should_rebuild(&self) -> Result<bool> {
        let size = self.storage.size()?;
        // Rebuild pays off when tombstones dominate the file or the
        // chains have grown well past the bucket count.
        Ok(self.dead_bytes * 2 > size.max(1) || self.count > self.num_buckets.saturating_mul(4))
    }

    fn rebuild(&mut self) -> Result<()> {
        let target = if self.count > self.num_buckets {
            self.count * 2 + 1
        } else {
            self.num_buckets
        };
        self.rebuild_into(target, self.align_pow)
    }

    fn rebuild_with(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let num_buckets = match params.get("num_buckets") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::invalid_argument(format!("malformed value for num_buckets: {raw}"))
            })?,
            None => self.num_buckets,
        };
        let align_pow = match params.get("align_pow") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::invalid_argument(format!("malformed value for align_pow: {raw}"))
            })?,
            None => self.align_pow,
        };
        config::check_hash_tuning(num_buckets, align_pow)?;
        self.rebuild_into(num_buckets.max(1), align_pow)
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
            ("count".into(), self.count.to_string()),
            ("num_buckets".into(), self.num_buckets.to_string()),
            ("align_pow".into(), self.align_pow.to_string()),
            ("record_comp_mode".into(), self.compression.name().into()),
            ("dead_bytes".into(), self.dead_bytes.to_string()),
            (
                "file_size".into(),
                self.storage.size().unwrap_or_default().to_string(),
            ),
        ]
    }

    fn class_name(&self) -> &'static str {
        "hash"
    }
}

impl Drop for HashStore {
    fn drop(&mut self) {
        if self.writable && self.header_dirty {
            let _ = self.write_counters();
            let _ = self.storage.flush();
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

    fn small_opts() -> OpenOptions {
        writable_opts().num_buckets(4)
    }

    #[test]
    fn set_get_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let mut store = HashStore::open(&path, &small_opts()).unwrap();
        store.set(b"alpha", b"1").unwrap();
        store.set(b"beta", b"2").unwrap();
        assert_eq!(store.get(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
        assert_eq!(store.count().unwrap(), 2);

        assert!(store.remove(b"alpha").unwrap());
        assert!(!store.remove(b"alpha").unwrap());
        assert_eq!(store.get(b"alpha").unwrap(), None);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn out_of_range_align_pow_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let err = HashStore::open(&path, &writable_opts().align_pow(200)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        // Rejected before the file is created.
        assert!(!path.exists());
    }

    #[test]
    fn overwrite_keeps_one_live_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let mut store = HashStore::open(&path, &small_opts()).unwrap();
        store.set(b"k", b"first").unwrap();
        store.set(b"k", b"second").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.dead_bytes > 0);
    }

    #[test]
    fn chains_survive_collisions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        // One bucket forces every record onto the same chain.
        let mut store = HashStore::open(&path, &writable_opts().num_buckets(1)).unwrap();
        for i in 0..50u32 {
            store.set(format!("key-{i}").as_bytes(), &i.to_le_bytes()).unwrap();
        }
        for i in 0..50u32 {
            assert_eq!(
                store.get(format!("key-{i}").as_bytes()).unwrap(),
                Some(i.to_le_bytes().to_vec())
            );
        }
        assert_eq!(store.count().unwrap(), 50);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        {
            let mut store = HashStore::open(&path, &small_opts()).unwrap();
            store.set(b"durable", b"yes").unwrap();
            store.sync(true).unwrap();
        }

        let store = HashStore::open(&path, &small_opts()).unwrap();
        assert!(store.is_healthy());
        assert_eq!(store.get(b"durable").unwrap(), Some(b"yes".to_vec()));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn unclean_close_recomputes_counters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        {
            let mut store = HashStore::open(&path, &small_opts()).unwrap();
            store.set(b"a", b"1").unwrap();
            store.set(b"b", b"2").unwrap();
            store.remove(b"a").unwrap();
            // Simulate a crash: put the dirty flag back and skip sync.
            store.storage.write_at(OFF_FLAGS, &[FLAG_DIRTY]).unwrap();
            store.header_dirty = false;
        }

        let store = HashStore::open(&path, &small_opts()).unwrap();
        assert!(!store.is_healthy());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn rebuild_reclaims_dead_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let mut store = HashStore::open(&path, &small_opts()).unwrap();
        for _ in 0..20 {
            store.set(b"churn", b"value that gets rewritten").unwrap();
        }
        store.set(b"keep", b"kept").unwrap();
        assert!(store.should_rebuild().unwrap());
        let before = store.file_size().unwrap();

        store.rebuild().unwrap();
        assert!(store.file_size().unwrap() < before);
        assert_eq!(store.dead_bytes, 0);
        assert_eq!(store.get(b"churn").unwrap(), Some(b"value that gets rewritten".to_vec()));
        assert_eq!(store.get(b"keep").unwrap(), Some(b"kept".to_vec()));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn rebuild_with_overrides_bucket_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let mut store = HashStore::open(&path, &small_opts()).unwrap();
        store.set(b"k", b"v").unwrap();

        let mut params = BTreeMap::new();
        params.insert("num_buckets".to_string(), "997".to_string());
        store.rebuild_with(&params).unwrap();

        assert_eq!(store.num_buckets, 997);
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn zlib_values_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let opts = small_opts().record_compression(Compression::Zlib);
        let mut store = HashStore::open(&path, &opts).unwrap();
        let value = vec![b'x'; 10_000];
        store.set(b"big", &value).unwrap();
        store.sync(true).unwrap();
        assert_eq!(store.get(b"big").unwrap(), Some(value.clone()));
        // Highly repetitive data must have shrunk on disk.
        assert!(store.file_size().unwrap() < 5_000);

        drop(store);
        let store = HashStore::open(&path, &opts).unwrap();
        assert_eq!(store.get(b"big").unwrap(), Some(value));
    }

    #[test]
    fn for_each_skips_tombstones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");

        let mut store = HashStore::open(&path, &small_opts()).unwrap();
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();
        store.remove(b"a").unwrap();

        let mut seen = Vec::new();
        store
            .for_each(&mut |k, v| {
                seen.push((k.to_vec(), v.to_vec()));
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![(b"b".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn rejects_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pkh");
        std::fs::write(&path, vec![0xAB; 100]).unwrap();

        let err = HashStore::open(&path, &small_opts()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }
}
