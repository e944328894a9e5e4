//! Ordered record cursors.
//!
//! A cursor holds its position by key, not by pointer into backend
//! state: every movement re-seeks through the backend's range bounds.
//! Concurrent mutation can shift a cursor's neighbors but never corrupts
//! it; a record that vanished under the cursor surfaces as
//! [`Error::NotFound`] on read. Cursors carry the database epoch from
//! their creation, so any use after `close` fails with [`Error::Closed`]
//! instead of touching freed state.

use crate::dbm::Dbm;
use crate::error::{Error, Result};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
enum Position {
    /// Never positioned.
    Unbound,
    /// Positioned at (or logically at) this key.
    At(Vec<u8>),
    /// Moved past either bound of the record space.
    Exhausted,
}

/// A bidirectional cursor over an ordered database.
#[derive(Debug)]
pub struct Cursor {
    db: Dbm,
    epoch: u64,
    position: Mutex<Position>,
}

impl Cursor {
    pub(crate) fn new(db: Dbm) -> Result<Self> {
        // Fails up front for unordered backends.
        db.with_ordered(|_| Ok(()))?;
        let epoch = db.epoch();
        Ok(Self {
            db,
            epoch,
            position: Mutex::new(Position::Unbound),
        })
    }

    fn check(&self) -> Result<()> {
        self.db.check_epoch(self.epoch)
    }

    fn seek(&self, target: Option<Vec<u8>>) -> Result<()> {
        let mut position = self.position.lock();
        *position = match target {
            Some(key) => Position::At(key),
            None => Position::Exhausted,
        };
        Ok(())
    }

    /// Moves to the comparator-minimum record.
    pub fn first(&self) -> Result<()> {
        self.check()?;
        let key = self.db.with_ordered(|o| o.lowest())?;
        self.seek(key)
    }

    /// Moves to the comparator-maximum record.
    pub fn last(&self) -> Result<()> {
        self.check()?;
        let key = self.db.with_ordered(|o| o.highest())?;
        self.seek(key)
    }

    /// Moves to the least record with key `>= key`.
    pub fn jump(&self, key: &[u8]) -> Result<()> {
        self.jump_upper(key, true)
    }

    /// Moves to the least record with key `>= key` (inclusive) or
    /// `> key` (exclusive).
    pub fn jump_upper(&self, key: &[u8], inclusive: bool) -> Result<()> {
        self.check()?;
        let found = self.db.with_ordered(|o| o.upper_bound(key, inclusive))?;
        self.seek(found)
    }

    /// Moves to the greatest record with key `<= key` (inclusive) or
    /// `< key` (exclusive).
    pub fn jump_lower(&self, key: &[u8], inclusive: bool) -> Result<()> {
        self.check()?;
        let found = self.db.with_ordered(|o| o.lower_bound(key, inclusive))?;
        self.seek(found)
    }

    /// Moves to the next record in comparator order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterator`] when unpositioned and
    /// [`Error::OutOfRange`] when the move passes the last record.
    pub fn next(&self) -> Result<()> {
        self.step(true)
    }

    /// Moves to the previous record in comparator order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIterator`] when unpositioned and
    /// [`Error::OutOfRange`] when the move passes the first record.
    pub fn previous(&self) -> Result<()> {
        self.step(false)
    }

    fn step(&self, forward: bool) -> Result<()> {
        self.check()?;
        let mut position = self.position.lock();
        let current = match &*position {
            Position::Unbound => return Err(Error::InvalidIterator),
            Position::Exhausted => return Err(Error::OutOfRange),
            Position::At(key) => key.clone(),
        };
        let found = self.db.with_ordered(|o| {
            if forward {
                o.upper_bound(&current, false)
            } else {
                o.lower_bound(&current, false)
            }
        })?;
        match found {
            Some(key) => {
                *position = Position::At(key);
                Ok(())
            }
            None => {
                *position = Position::Exhausted;
                Err(Error::OutOfRange)
            }
        }
    }

    fn current_key(&self) -> Result<Vec<u8>> {
        match &*self.position.lock() {
            Position::Unbound => Err(Error::InvalidIterator),
            Position::Exhausted => Err(Error::OutOfRange),
            Position::At(key) => Ok(key.clone()),
        }
    }

    /// Returns the record under the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the record vanished through
    /// concurrent mutation.
    pub fn get(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        self.check()?;
        let key = self.current_key()?;
        match self.db.get(&key)? {
            Some(value) => Ok((key, value)),
            None => Err(Error::NotFound),
        }
    }

    /// Returns the key under the cursor without reading the value.
    pub fn key(&self) -> Result<Vec<u8>> {
        self.check()?;
        self.current_key()
    }

    /// Replaces the value of the record under the cursor. The position
    /// is unchanged.
    pub fn set_value(&self, value: &[u8]) -> Result<()> {
        self.check()?;
        let key = self.current_key()?;
        self.db.set(&key, value)
    }

    /// Removes the record under the cursor and moves to the following
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the record already vanished.
    pub fn remove(&self) -> Result<()> {
        self.check()?;
        let key = self.current_key()?;
        self.db.remove(&key)?;
        let following = self.db.with_ordered(|o| o.upper_bound(&key, false))?;
        self.seek(following)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendClass, OpenOptions};

    fn tree_db(keys: &[&[u8]]) -> Dbm {
        let db = Dbm::open_in_memory(OpenOptions::default().class(BackendClass::MemTree)).unwrap();
        for key in keys {
            db.set(key, b"v").unwrap();
        }
        db
    }

    #[test]
    fn walks_forward_and_backward() {
        let db = tree_db(&[b"b", b"d", b"f"]);
        let cursor = db.cursor().unwrap();

        cursor.first().unwrap();
        assert_eq!(cursor.key().unwrap(), b"b");
        cursor.next().unwrap();
        assert_eq!(cursor.key().unwrap(), b"d");
        cursor.next().unwrap();
        assert_eq!(cursor.key().unwrap(), b"f");
        assert!(matches!(cursor.next(), Err(Error::OutOfRange)));

        cursor.last().unwrap();
        cursor.previous().unwrap();
        assert_eq!(cursor.key().unwrap(), b"d");
    }

    #[test]
    fn jump_lands_on_or_after_target() {
        let db = tree_db(&[b"b", b"d", b"f"]);
        let cursor = db.cursor().unwrap();

        cursor.jump(b"c").unwrap();
        assert_eq!(cursor.key().unwrap(), b"d");
        cursor.jump(b"d").unwrap();
        assert_eq!(cursor.key().unwrap(), b"d");

        cursor.jump_upper(b"d", false).unwrap();
        assert_eq!(cursor.key().unwrap(), b"f");
        cursor.jump_lower(b"d", false).unwrap();
        assert_eq!(cursor.key().unwrap(), b"b");
        cursor.jump_lower(b"d", true).unwrap();
        assert_eq!(cursor.key().unwrap(), b"d");
    }

    #[test]
    fn unpositioned_and_exhausted_states() {
        let db = tree_db(&[b"a"]);
        let cursor = db.cursor().unwrap();

        assert!(matches!(cursor.get(), Err(Error::InvalidIterator)));
        assert!(matches!(cursor.next(), Err(Error::InvalidIterator)));

        cursor.first().unwrap();
        assert!(matches!(cursor.next(), Err(Error::OutOfRange)));
        assert!(matches!(cursor.get(), Err(Error::OutOfRange)));
    }

    #[test]
    fn empty_database_exhausts_immediately() {
        let db = tree_db(&[]);
        let cursor = db.cursor().unwrap();
        cursor.first().unwrap();
        assert!(matches!(cursor.get(), Err(Error::OutOfRange)));
    }

    #[test]
    fn set_value_and_remove_through_cursor() {
        let db = tree_db(&[b"a", b"b", b"c"]);
        let cursor = db.cursor().unwrap();

        cursor.jump(b"b").unwrap();
        cursor.set_value(b"changed").unwrap();
        assert_eq!(db.get(b"b").unwrap(), Some(b"changed".to_vec()));

        cursor.remove().unwrap();
        assert_eq!(db.get(b"b").unwrap(), None);
        // Cursor moved to the following record.
        assert_eq!(cursor.key().unwrap(), b"c");
    }

    #[test]
    fn vanished_record_is_not_found() {
        let db = tree_db(&[b"a", b"b"]);
        let cursor = db.cursor().unwrap();
        cursor.jump(b"b").unwrap();

        db.remove(b"b").unwrap();
        assert!(matches!(cursor.get(), Err(Error::NotFound)));
    }

    #[test]
    fn use_after_close_is_closed() {
        let db = tree_db(&[b"a"]);
        let cursor = db.cursor().unwrap();
        cursor.first().unwrap();

        db.close().unwrap();
        assert!(matches!(cursor.get(), Err(Error::Closed)));
        assert!(matches!(cursor.first(), Err(Error::Closed)));
    }

    #[test]
    fn unordered_backend_is_unsupported() {
        let db = Dbm::open_in_memory(OpenOptions::default().class(BackendClass::MemHash)).unwrap();
        assert!(matches!(db.cursor(), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn concurrent_mutation_shifts_neighbors_safely() {
        let db = tree_db(&[b"b", b"d"]);
        let cursor = db.cursor().unwrap();
        cursor.first().unwrap();

        // A new record between the cursor and its old neighbor becomes
        // the next stop.
        db.set(b"c", b"v").unwrap();
        cursor.next().unwrap();
        assert_eq!(cursor.key().unwrap(), b"c");
    }
}
