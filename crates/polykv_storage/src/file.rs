//! File-backed storage for persistent databases.

use crate::api::StorageFile;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-backed byte store.
///
/// Data survives process restarts. The current size is cached so bounds
/// checks and appends never hit the filesystem metadata path.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to reach the disk
///
/// # Locking
///
/// [`FileStorage::open_locked`] takes an exclusive advisory lock on the
/// file so that two processes cannot both open the same database
/// writable. The lock is released when the store is dropped.
///
/// # Example
///
/// ```no_run
/// use polykv_storage::{StorageFile, FileStorage};
/// use std::path::Path;
///
/// let storage = FileStorage::open(Path::new("data.pkv")).unwrap();
/// storage.append(b"persistent data").unwrap();
/// storage.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileStorage {
    /// Opens or creates a file store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Opens a file store and takes an exclusive advisory lock on it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the
    /// lock, or any error [`Self::open`] can return.
    pub fn open_locked(path: &Path) -> StorageResult<Self> {
        let storage = Self::open(path)?;
        {
            let file = storage.file.read();
            file.try_lock_exclusive()
                .map_err(|_| StorageError::Locked {
                    path: path.to_path_buf(),
                })?;
        }
        Ok(storage)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageFile for FileStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let size = *self.size.read();
        let end = offset.saturating_add(buf.len() as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len: buf.len(),
                size,
            });
        }

        if buf.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        let end = offset + data.len() as u64;
        if end > *size {
            *size = end;
        }
        Ok(())
    }

    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        if !data.is_empty() {
            file.seek(SeekFrom::End(0))?;
            file.write_all(data)?;
            *size += data.len() as u64;
        }
        Ok(offset)
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate {} bytes to {new_size}", *size),
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }
}
