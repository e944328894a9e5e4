//! Database restoration from an update log.

use crate::config::{BackendClass, OpenOptions};
use crate::dbm::Dbm;
use crate::error::{Error, Result};
use crate::ulog::{self, UlogOp};
use std::path::Path;
use tracing::{info, warn};

/// Rebuilds a database at `new_path` from a damaged sibling and its
/// update log.
///
/// The new database is seeded with the records of `old_path` when that
/// file exists and opens healthy; an unreadable or unhealthy original
/// contributes nothing. The update log at `ulog_prefix` is then replayed
/// in offset order, keeping entries whose `dbm_index` matches and whose
/// offset is at most `end_offset` (negative = no limit).
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when `new_path` already exists,
/// and [`Error::Corruption`] for a malformed update log.
pub fn restore_database(
    old_path: Option<&Path>,
    new_path: &Path,
    class: BackendClass,
    ulog_prefix: Option<&Path>,
    dbm_index: u32,
    end_offset: i64,
) -> Result<()> {
    if new_path.exists() {
        return Err(Error::invalid_argument(format!(
            "restore target already exists: {}",
            new_path.display()
        )));
    }

    let new_db = Dbm::open(new_path, OpenOptions::default().class(class))?;

    if let Some(old_path) = old_path {
        if old_path.exists() {
            seed_from_original(&new_db, old_path, class);
        }
    }

    let mut replayed = 0u64;
    if let Some(prefix) = ulog_prefix {
        for entry in ulog::read_entries(prefix)? {
            if entry.dbm_index != dbm_index {
                continue;
            }
            if end_offset >= 0 && entry.offset > end_offset as u64 {
                continue;
            }
            match entry.op {
                UlogOp::Set => new_db.set(&entry.key, &entry.value)?,
                UlogOp::Remove => match new_db.remove(&entry.key) {
                    // The seed copy may predate or postdate this entry.
                    Ok(()) | Err(Error::NotFound) => {}
                    Err(other) => return Err(other),
                },
                UlogOp::Clear => new_db.clear()?,
            }
            replayed += 1;
        }
    }

    info!(
        path = %new_path.display(),
        records = new_db.count()?,
        replayed,
        "restored database"
    );
    new_db.sync(true)?;
    new_db.close()
}

/// Copies the original's records into the new database, best-effort. A
/// damaged original is skipped; the update log is the authoritative
/// source.
fn seed_from_original(new_db: &Dbm, old_path: &Path, class: BackendClass) {
    let opts = OpenOptions::default().class(class).writable(false);
    let old_db = match Dbm::open(old_path, opts) {
        Ok(db) => db,
        Err(error) => {
            warn!(path = %old_path.display(), %error, "cannot open original, seeding skipped");
            return;
        }
    };
    if !old_db.is_healthy() {
        warn!(path = %old_path.display(), "original is unhealthy, seeding skipped");
        return;
    }
    let copied = new_db.scan_from(&old_db);
    if let Err(error) = copied {
        warn!(path = %old_path.display(), %error, "partial seed from original");
    }
}

impl Dbm {
    /// Copies every record of `source` into `self`.
    pub(crate) fn scan_from(&self, source: &Dbm) -> Result<()> {
        source.scan(&mut |key, value| {
            self.set(key, value)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UlogOptions;
    use tempfile::tempdir;

    #[test]
    fn restores_from_log_alone() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db.pkh");
        let prefix = dir.path().join("db-ulog");

        {
            let opts = OpenOptions::default().ulog(UlogOptions::new(prefix.clone()));
            let db = Dbm::open(&db_path, opts).unwrap();
            db.set(b"a", b"1").unwrap();
            db.set(b"b", b"2").unwrap();
            db.remove(b"a").unwrap();
            db.close().unwrap();
        }

        let restored_path = dir.path().join("restored.pkh");
        restore_database(
            None,
            &restored_path,
            BackendClass::Hash,
            Some(&prefix),
            0,
            -1,
        )
        .unwrap();

        let restored = Dbm::open(&restored_path, OpenOptions::default()).unwrap();
        assert_eq!(restored.get(b"a").unwrap(), None);
        assert_eq!(restored.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(restored.count().unwrap(), 1);
    }

    #[test]
    fn replay_tolerates_remove_of_absent_key() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("db-ulog");

        // A log whose remove targets a key the replay never created,
        // as happens when seeding from the original is skipped.
        {
            let writer = ulog::UlogWriter::open(&UlogOptions::new(prefix.clone())).unwrap();
            writer.write(UlogOp::Remove, b"ghost", b"").unwrap();
            writer.write(UlogOp::Set, b"kept", b"v").unwrap();
            writer.sync(false).unwrap();
        }

        let restored_path = dir.path().join("restored.pkh");
        restore_database(
            None,
            &restored_path,
            BackendClass::Hash,
            Some(&prefix),
            0,
            -1,
        )
        .unwrap();

        let restored = Dbm::open(&restored_path, OpenOptions::default()).unwrap();
        assert_eq!(restored.get(b"kept").unwrap(), Some(b"v".to_vec()));
        assert_eq!(restored.count().unwrap(), 1);
    }

    #[test]
    fn seeds_from_healthy_original() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db.pkh");

        {
            let db = Dbm::open(&db_path, OpenOptions::default()).unwrap();
            db.set(b"seeded", b"yes").unwrap();
            db.close().unwrap();
        }

        let restored_path = dir.path().join("restored.pkh");
        restore_database(
            Some(&db_path),
            &restored_path,
            BackendClass::Hash,
            None,
            0,
            -1,
        )
        .unwrap();

        let restored = Dbm::open(&restored_path, OpenOptions::default()).unwrap();
        assert_eq!(restored.get(b"seeded").unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn end_offset_bounds_the_replay() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db.pkh");
        let prefix = dir.path().join("db-ulog");

        {
            let opts = OpenOptions::default().ulog(UlogOptions::new(prefix.clone()));
            let db = Dbm::open(&db_path, opts).unwrap();
            db.set(b"first", b"1").unwrap(); // offset 1
            db.set(b"second", b"2").unwrap(); // offset 2
            db.set(b"third", b"3").unwrap(); // offset 3
            db.close().unwrap();
        }

        let restored_path = dir.path().join("restored.pkh");
        restore_database(
            None,
            &restored_path,
            BackendClass::Hash,
            Some(&prefix),
            0,
            2,
        )
        .unwrap();

        let restored = Dbm::open(&restored_path, OpenOptions::default()).unwrap();
        assert_eq!(restored.count().unwrap(), 2);
        assert_eq!(restored.get(b"third").unwrap(), None);
    }

    #[test]
    fn replay_filters_by_dbm_index() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("shared-ulog");

        // Two logical databases writing into one log stream.
        for (index, key) in [(0u32, b"zero".as_slice()), (1u32, b"one".as_slice())] {
            let db_path = dir.path().join(format!("db{index}.pkh"));
            let mut ulog = UlogOptions::new(prefix.clone());
            ulog.dbm_index = index;
            let db = Dbm::open(&db_path, OpenOptions::default().ulog(ulog)).unwrap();
            db.set(key, b"v").unwrap();
            db.close().unwrap();
        }

        let restored_path = dir.path().join("restored.pkh");
        restore_database(
            None,
            &restored_path,
            BackendClass::Hash,
            Some(&prefix),
            1,
            -1,
        )
        .unwrap();

        let restored = Dbm::open(&restored_path, OpenOptions::default()).unwrap();
        assert_eq!(restored.get(b"one").unwrap(), Some(b"v".to_vec()));
        assert_eq!(restored.get(b"zero").unwrap(), None);
    }

    #[test]
    fn existing_target_is_rejected() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("occupied.pkh");
        std::fs::write(&target, b"something").unwrap();

        let err = restore_database(None, &target, BackendClass::Hash, None, 0, -1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }
}
