//! Storage trait definition.

use crate::error::StorageResult;

/// A flat byte store underlying one database file.
///
/// Implementations are **opaque byte spaces**. They provide positional
/// reads and writes, appends, and flushing. The record backends own all
/// format interpretation - storage does not understand buckets, records,
/// or log entries.
///
/// # Invariants
///
/// - `append` returns the offset where the data landed
/// - `read_at` returns exactly the bytes previously written there
/// - `write_at` may extend the store; the gap, if any, is zero-filled
/// - after `sync` returns, all prior writes survive process termination
/// - implementations must be `Send + Sync`; all methods take `&self` and
///   lock internally, because one store is shared by concurrent callers
pub trait StorageFile: Send + Sync {
    /// Fills `buf` with bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the read extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()>;

    /// Writes `data` at `offset`, extending the store if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data to the end of the store.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Truncates the store to the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&self, new_size: u64) -> StorageResult<()>;

    /// Flushes pending writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Reads `len` bytes at `offset` into a fresh vector.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::read_at`].
    fn read_vec(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}
