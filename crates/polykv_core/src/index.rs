//! Secondary index built on an ordered database.
//!
//! An index maps one key to many values by storing each pair as a single
//! empty-valued record whose key is a composite: a `u32` big-endian
//! length prefix of the key followed by the key bytes and the value
//! bytes. Under byte order, all pairs for one key are contiguous and
//! sorted by value, so lookups are prefix range scans.

use crate::config::OpenOptions;
use crate::cursor::Cursor;
use crate::dbm::Dbm;
use crate::error::{Error, Result};
use std::path::Path;

fn encode_entry(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(key.len())
        .map_err(|_| Error::invalid_argument("index key longer than u32::MAX"))?;
    let mut entry = Vec::with_capacity(4 + key.len() + value.len());
    entry.extend_from_slice(&len.to_be_bytes());
    entry.extend_from_slice(key);
    entry.extend_from_slice(value);
    Ok(entry)
}

fn encode_prefix(key: &[u8]) -> Result<Vec<u8>> {
    encode_entry(key, b"")
}

fn decode_entry(entry: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    if entry.len() < 4 {
        return Err(Error::corruption("index entry shorter than its prefix"));
    }
    let len = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as usize;
    if entry.len() < 4 + len {
        return Err(Error::corruption("index entry shorter than its key"));
    }
    Ok((entry[4..4 + len].to_vec(), entry[4 + len..].to_vec()))
}

/// A one-to-many secondary index.
#[derive(Debug, Clone)]
pub struct Index {
    db: Dbm,
}

impl Index {
    /// Opens a file-backed index.
    ///
    /// The composite encoding requires byte order, so the comparator is
    /// forced to lexical.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for an unordered backend class.
    pub fn open(path: impl AsRef<Path>, opts: OpenOptions) -> Result<Self> {
        let opts = Self::validate(opts)?;
        Ok(Self {
            db: Dbm::open(path, opts)?,
        })
    }

    /// Opens an in-memory index (`memtree`).
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::open`].
    pub fn open_in_memory(opts: OpenOptions) -> Result<Self> {
        let opts = Self::validate(opts)?;
        Ok(Self {
            db: Dbm::open_in_memory(opts)?,
        })
    }

    fn validate(opts: OpenOptions) -> Result<OpenOptions> {
        if !opts.class.is_ordered() {
            return Err(Error::unsupported(format!(
                "index requires an ordered backend, got {}",
                opts.class.name()
            )));
        }
        Ok(opts.key_comparator(crate::comparator::KeyComparator::Lexical))
    }

    /// Registers a key/value pair. Adding an existing pair is a no-op.
    pub fn add(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.set(&encode_entry(key, value)?, b"")
    }

    /// Unregisters a pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the pair is not registered.
    pub fn remove(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.remove(&encode_entry(key, value)?)
    }

    /// Confirms the exact pair is registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when it is not.
    pub fn check(&self, key: &[u8], value: &[u8]) -> Result<()> {
        match self.db.get(&encode_entry(key, value)?)? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound),
        }
    }

    /// Returns the values registered under `key`, sorted by byte order.
    /// `max` bounds the result count; 0 means unlimited.
    pub fn get_values(&self, key: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        let prefix = encode_prefix(key)?;
        let cursor = self.db.cursor()?;
        cursor.jump(&prefix)?;

        let mut values = Vec::new();
        loop {
            let entry = match cursor.key() {
                Ok(entry) => entry,
                Err(Error::OutOfRange) => break,
                Err(other) => return Err(other),
            };
            if !entry.starts_with(&prefix) {
                break;
            }
            let (_, value) = decode_entry(&entry)?;
            values.push(value);
            if max != 0 && values.len() >= max {
                break;
            }
            match cursor.next() {
                Ok(()) => {}
                Err(Error::OutOfRange) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(values)
    }

    /// Returns the number of registered pairs.
    pub fn count(&self) -> Result<u64> {
        self.db.count()
    }

    /// Removes every pair.
    pub fn clear(&self) -> Result<()> {
        self.db.clear()
    }

    /// Creates an iterator positioned at the first pair whose key is
    /// `>= partial_key`.
    ///
    /// Enumeration follows the composite encoding: the length prefix
    /// sorts first, so pairs come out grouped by key length and only
    /// sorted by key bytes within each length group. `b"b"` enumerates
    /// before `b"aa"`.
    pub fn jump_cursor(&self, partial_key: &[u8]) -> Result<IndexCursor> {
        let cursor = self.db.cursor()?;
        cursor.jump(&encode_prefix(partial_key)?)?;
        Ok(IndexCursor { cursor })
    }

    /// Flushes the underlying database.
    pub fn sync(&self, hard: bool) -> Result<()> {
        self.db.sync(hard)
    }

    /// Whether a rebuild of the underlying database would pay off.
    pub fn should_be_rebuilt(&self) -> Result<bool> {
        self.db.should_be_rebuilt()
    }

    /// Compacts the underlying database.
    pub fn rebuild(&self) -> Result<()> {
        self.db.rebuild()
    }

    /// Closes the underlying database.
    pub fn close(&self) -> Result<()> {
        self.db.close()
    }

    /// The underlying database handle.
    #[must_use]
    pub fn inner(&self) -> &Dbm {
        &self.db
    }
}

/// An iterator over index pairs in key-then-value order.
#[derive(Debug)]
pub struct IndexCursor {
    cursor: Cursor,
}

impl IndexCursor {
    /// Returns the pair under the iterator, or `None` when exhausted.
    pub fn value(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match self.cursor.key() {
            Ok(entry) => Ok(Some(decode_entry(&entry)?)),
            Err(Error::OutOfRange | Error::InvalidIterator) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Advances to the next pair. Returns `false` when exhausted.
    pub fn advance(&self) -> Result<bool> {
        match self.cursor.next() {
            Ok(()) => Ok(true),
            Err(Error::OutOfRange) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendClass;

    fn mem_index() -> Index {
        Index::open_in_memory(OpenOptions::default().class(BackendClass::MemTree)).unwrap()
    }

    #[test]
    fn add_check_remove() {
        let index = mem_index();
        index.add(b"artist", b"song-1").unwrap();
        index.add(b"artist", b"song-2").unwrap();

        index.check(b"artist", b"song-1").unwrap();
        assert!(matches!(index.check(b"artist", b"song-3"), Err(Error::NotFound)));
        assert_eq!(index.count().unwrap(), 2);

        index.remove(b"artist", b"song-1").unwrap();
        assert!(matches!(
            index.remove(b"artist", b"song-1"),
            Err(Error::NotFound)
        ));
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn absent_pair_reports_not_found() {
        let index = mem_index();
        index.add(b"tags", b"x").unwrap();

        assert!(matches!(index.check(b"tags", b"y"), Err(Error::NotFound)));
        assert!(matches!(index.remove(b"tags", b"y"), Err(Error::NotFound)));
        // The registered pair is untouched.
        index.check(b"tags", b"x").unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn add_is_idempotent() {
        let index = mem_index();
        index.add(b"k", b"v").unwrap();
        index.add(b"k", b"v").unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn get_values_scans_one_key() {
        let index = mem_index();
        index.add(b"a", b"2").unwrap();
        index.add(b"a", b"1").unwrap();
        index.add(b"ab", b"x").unwrap();
        index.add(b"b", b"3").unwrap();

        // Values for "a" only - no bleed into "ab", sorted by byte order.
        let values = index.get_values(b"a", 0).unwrap();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);

        assert_eq!(index.get_values(b"a", 1).unwrap(), vec![b"1".to_vec()]);
        assert!(index.get_values(b"missing", 0).unwrap().is_empty());
    }

    #[test]
    fn keys_with_shared_prefixes_stay_separate() {
        let index = mem_index();
        index.add(b"ab", b"1").unwrap();
        index.add(b"a", b"b1").unwrap();

        assert_eq!(index.get_values(b"ab", 0).unwrap(), vec![b"1".to_vec()]);
        assert_eq!(index.get_values(b"a", 0).unwrap(), vec![b"b1".to_vec()]);
    }

    #[test]
    fn jump_cursor_walks_pairs_in_order() {
        let index = mem_index();
        index.add(b"a", b"1").unwrap();
        index.add(b"b", b"2").unwrap();
        index.add(b"c", b"3").unwrap();

        let cursor = index.jump_cursor(b"b").unwrap();
        let mut seen = Vec::new();
        while let Some((key, value)) = cursor.value().unwrap() {
            seen.push((key, value));
            if !cursor.advance().unwrap() {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec())
            ]
        );
    }

    #[test]
    fn jump_cursor_groups_keys_by_length() {
        let index = mem_index();
        index.add(b"aa", b"1").unwrap();
        index.add(b"b", b"2").unwrap();

        let cursor = index.jump_cursor(b"").unwrap();
        let mut keys = Vec::new();
        while let Some((key, _)) = cursor.value().unwrap() {
            keys.push(key);
            if !cursor.advance().unwrap() {
                break;
            }
        }
        // The length prefix sorts first: shorter keys come out before
        // longer ones regardless of byte order.
        assert_eq!(keys, vec![b"b".to_vec(), b"aa".to_vec()]);
    }

    #[test]
    fn unordered_class_is_rejected() {
        let err = Index::open_in_memory(OpenOptions::default().class(BackendClass::MemHash))
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn composite_roundtrip() {
        let entry = encode_entry(b"key", b"value").unwrap();
        let (key, value) = decode_entry(&entry).unwrap();
        assert_eq!(key, b"key");
        assert_eq!(value, b"value");

        // Empty components survive.
        let entry = encode_entry(b"", b"").unwrap();
        assert_eq!(decode_entry(&entry).unwrap(), (Vec::new(), Vec::new()));
    }
}
