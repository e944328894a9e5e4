//! Flat-record export and import.
//!
//! The flat-record format is a sequential stream of `u32`-LE
//! length-prefixed key/value frames with no header, usable for backup
//! and for moving data between backend classes. It is lossless for
//! arbitrary binary keys and values.

use crate::dbm::Dbm;
use crate::error::Result;
use crate::wire::{self, SliceReader};
use polykv_storage::StorageFile;

/// Writes every record to `dest` as flat records, replacing its
/// content.
///
/// # Errors
///
/// Returns the scan or storage error encountered.
pub fn export_flat_records(db: &Dbm, dest: &dyn StorageFile) -> Result<()> {
    dest.truncate(0)?;
    db.scan(&mut |key, value| {
        let mut frame = Vec::with_capacity(8 + key.len() + value.len());
        wire::put_frame(&mut frame, key, value);
        dest.append(&frame)?;
        Ok(true)
    })?;
    dest.flush()?;
    Ok(())
}

/// Loads flat records from `src` into the database. Existing records
/// with the same keys are replaced.
///
/// # Errors
///
/// Returns [`crate::Error::Corruption`] for a truncated stream.
pub fn import_flat_records(db: &Dbm, src: &dyn StorageFile) -> Result<()> {
    let size = src.size()?;
    let data = src.read_vec(0, size as usize)?;
    let mut reader = SliceReader::new(&data);
    while reader.remaining() > 0 {
        let (key, value) = wire::read_frame(&mut reader)?;
        db.set(&key, &value)?;
    }
    Ok(())
}

/// Writes every key to `dest` as newline-delimited lines, replacing its
/// content.
///
/// Keys containing a newline byte make the dump ambiguous; the caller is
/// expected to use this format for text keys only.
///
/// # Errors
///
/// Returns the scan or storage error encountered.
pub fn export_keys_as_lines(db: &Dbm, dest: &dyn StorageFile) -> Result<()> {
    dest.truncate(0)?;
    db.scan(&mut |key, _| {
        let mut line = Vec::with_capacity(key.len() + 1);
        line.extend_from_slice(key);
        line.push(b'\n');
        dest.append(&line)?;
        Ok(true)
    })?;
    dest.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendClass, OpenOptions};
    use polykv_storage::MemoryStorage;

    fn db_of(class: BackendClass) -> Dbm {
        Dbm::open_in_memory(OpenOptions::default().class(class)).unwrap()
    }

    #[test]
    fn flat_records_roundtrip_binary_content() {
        let source = db_of(BackendClass::MemTree);
        source.set(b"text", b"plain").unwrap();
        source.set(&[0x00, 0xFF, 0x7F], &[0xDE, 0xAD, 0x00]).unwrap();
        source.set(b"", b"empty key").unwrap();

        let file = MemoryStorage::new();
        export_flat_records(&source, &file).unwrap();

        let target = db_of(BackendClass::MemHash);
        import_flat_records(&target, &file).unwrap();

        assert_eq!(target.count().unwrap(), 3);
        assert_eq!(target.get(b"text").unwrap(), Some(b"plain".to_vec()));
        assert_eq!(
            target.get(&[0x00, 0xFF, 0x7F]).unwrap(),
            Some(vec![0xDE, 0xAD, 0x00])
        );
        assert_eq!(target.get(b"").unwrap(), Some(b"empty key".to_vec()));
    }

    #[test]
    fn truncated_stream_is_corruption() {
        let file = MemoryStorage::new();
        file.append(&[5, 0, 0, 0]).unwrap();

        let db = db_of(BackendClass::MemHash);
        let err = import_flat_records(&db, &file).unwrap_err();
        assert!(matches!(err, crate::error::Error::Corruption { .. }));
    }

    #[test]
    fn keys_as_lines() {
        let db = db_of(BackendClass::MemTree);
        db.set(b"alpha", b"1").unwrap();
        db.set(b"beta", b"2").unwrap();

        let file = MemoryStorage::new();
        export_keys_as_lines(&db, &file).unwrap();

        let size = file.size().unwrap();
        let dump = file.read_vec(0, size as usize).unwrap();
        assert_eq!(dump, b"alpha\nbeta\n");
    }

    #[test]
    fn export_replaces_destination_content() {
        let db = db_of(BackendClass::MemTree);
        db.set(b"k", b"v").unwrap();

        let file = MemoryStorage::new();
        file.append(b"stale bytes from a previous dump").unwrap();
        export_flat_records(&db, &file).unwrap();

        let target = db_of(BackendClass::MemHash);
        import_flat_records(&target, &file).unwrap();
        assert_eq!(target.count().unwrap(), 1);
    }
}
