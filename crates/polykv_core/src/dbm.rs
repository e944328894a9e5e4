//! Database facade.
//!
//! [`Dbm`] binds one backend, the record-lock table, and the optional
//! update log behind a single cloneable handle. All operations are
//! synchronous; concurrency comes from calling a shared handle from many
//! threads.
//!
//! # Locking
//!
//! Two layers, always acquired in the same order: the sharded record
//! lock(s) first, then the backend lock. Single-key operations lock one
//! shard; multi-key operations collect the distinct shards of all their
//! keys and take them in ascending shard order, so concurrent multi-key
//! calls cannot deadlock. `rebuild` and `clear` hold the backend lock
//! exclusively for their whole duration.
//!
//! # Example
//!
//! ```no_run
//! use polykv_core::{Dbm, OpenOptions};
//!
//! let db = Dbm::open("data.pkh", OpenOptions::default()).unwrap();
//! db.set(b"greeting", b"hello").unwrap();
//! assert_eq!(db.get(b"greeting").unwrap(), Some(b"hello".to_vec()));
//! db.close().unwrap();
//! ```

use crate::backend::{open_backend, OrderedStore, RecordStore};
use crate::config::OpenOptions;
use crate::error::{Error, Result};
use crate::locks::LockTable;
use crate::process::{RecordProcessor, Reply};
use crate::ulog::{UlogOp, UlogWriter};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

pub(crate) struct DbmInner {
    backend: RwLock<Option<Box<dyn RecordStore>>>,
    locks: LockTable,
    opts: OpenOptions,
    path: Option<PathBuf>,
    /// Bumped on close; cursors carry the epoch they were created under.
    epoch: AtomicU64,
    ulog: Option<UlogWriter>,
    timestamp: RwLock<SystemTime>,
}

/// A polymorphic database handle.
///
/// Cheap to clone; all clones share the same backend, locks, and update
/// log. Dropping the last clone closes the database best-effort.
#[derive(Clone)]
pub struct Dbm {
    inner: Arc<DbmInner>,
}

impl std::fmt::Debug for Dbm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dbm")
            .field("class", &self.inner.opts.class.name())
            .field("path", &self.inner.path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Dbm {
    /// Opens a file-backed database.
    ///
    /// # Errors
    ///
    /// Returns the backend's open error, or [`Error::InvalidArgument`]
    /// for malformed options.
    pub fn open(path: impl AsRef<Path>, opts: OpenOptions) -> Result<Self> {
        Self::open_impl(Some(path.as_ref().to_path_buf()), opts)
    }

    /// Opens an in-memory database (`memhash`, `memtree`, or `cache`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the selected class needs a
    /// file path.
    pub fn open_in_memory(opts: OpenOptions) -> Result<Self> {
        Self::open_impl(None, opts)
    }

    fn open_impl(path: Option<PathBuf>, opts: OpenOptions) -> Result<Self> {
        let backend = open_backend(&opts, path.as_deref())?;
        let ulog = match (&opts.ulog, opts.writable) {
            (Some(ulog_opts), true) => Some(UlogWriter::open(ulog_opts)?),
            _ => None,
        };
        match &path {
            Some(p) => info!(
                class = opts.class.name(),
                path = %p.display(),
                writable = opts.writable,
                "opened database"
            ),
            None => info!(
                class = opts.class.name(),
                writable = opts.writable,
                "opened database"
            ),
        }
        Ok(Self {
            inner: Arc::new(DbmInner {
                backend: RwLock::new(Some(backend)),
                locks: LockTable::new(),
                opts,
                path,
                epoch: AtomicU64::new(0),
                ulog,
                timestamp: RwLock::new(SystemTime::now()),
            }),
        })
    }

    /// Syncs and releases the backend. Further operations on this handle
    /// or any clone fail with [`Error::Closed`]; open cursors are
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Returns the backend's final sync error. The handle is closed
    /// either way.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.backend.write();
        let store = guard.take();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        drop(guard);

        let mut result = Ok(());
        if let Some(mut store) = store {
            if self.inner.opts.writable {
                result = store.sync(true);
            }
            info!(class = store.class_name(), "closed database");
        }
        if let Some(ulog) = &self.inner.ulog {
            ulog.sync(true)?;
        }
        result
    }

    // ---- handle state -------------------------------------------------

    /// Whether the handle is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.backend.read().is_some()
    }

    /// Whether the handle may mutate records.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.inner.opts.writable && self.is_open()
    }

    /// Whether the backend passed its integrity checks.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.inner
            .backend
            .read()
            .as_deref()
            .is_some_and(|store| store.is_healthy())
    }

    /// Whether the backend keeps records in comparator order.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.inner.opts.class.is_ordered()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn check_epoch(&self, expected: u64) -> Result<()> {
        if !self.is_open() || self.epoch() != expected {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if !self.inner.opts.writable {
            return Err(Error::invalid_argument("database is read-only"));
        }
        Ok(())
    }

    fn with_store<R>(&self, f: impl FnOnce(&dyn RecordStore) -> Result<R>) -> Result<R> {
        let guard = self.inner.backend.read();
        let store = guard.as_deref().ok_or(Error::Closed)?;
        f(store)
    }

    fn with_store_mut<R>(&self, f: impl FnOnce(&mut dyn RecordStore) -> Result<R>) -> Result<R> {
        let mut guard = self.inner.backend.write();
        let store = guard.as_deref_mut().ok_or(Error::Closed)?;
        f(store)
    }

    pub(crate) fn with_ordered<R>(
        &self,
        f: impl FnOnce(&dyn OrderedStore) -> Result<R>,
    ) -> Result<R> {
        self.with_store(|store| {
            let ordered = store.ordered().ok_or_else(|| {
                Error::unsupported(format!(
                    "backend class {} is not ordered",
                    store.class_name()
                ))
            })?;
            f(ordered)
        })
    }

    fn touch(&self) {
        *self.inner.timestamp.write() = SystemTime::now();
    }

    fn log(&self, op: UlogOp, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(ulog) = &self.inner.ulog {
            ulog.write(op, key, value)?;
        }
        Ok(())
    }

    // ---- single-record operations -------------------------------------

    /// Returns the value for a key, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_store(|store| store.get(key))
    }

    /// Returns the value for a key, or `default` if absent.
    pub fn get_or(&self, key: &[u8], default: &[u8]) -> Result<Vec<u8>> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_vec()))
    }

    /// Stores a record, replacing any existing value.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        let _guard = self.inner.locks.lock_key(key);
        self.with_store_mut(|store| store.set(key, value))?;
        self.log(UlogOp::Set, key, value)?;
        self.touch();
        Ok(())
    }

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the key is absent; nothing is
    /// logged in that case.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.check_writable()?;
        let _guard = self.inner.locks.lock_key(key);
        let removed = self.with_store_mut(|store| store.remove(key))?;
        if !removed {
            return Err(Error::NotFound);
        }
        self.log(UlogOp::Remove, key, b"")?;
        self.touch();
        Ok(())
    }

    /// Appends `value` to the record, inserting `delimiter` between the
    /// existing value and the addition. Creates the record (without a
    /// delimiter) when absent.
    pub fn append(&self, key: &[u8], value: &[u8], delimiter: &[u8]) -> Result<()> {
        self.check_writable()?;
        let _guard = self.inner.locks.lock_key(key);
        let combined = self.with_store_mut(|store| {
            let combined = match store.get(key)? {
                Some(mut existing) => {
                    existing.extend_from_slice(delimiter);
                    existing.extend_from_slice(value);
                    existing
                }
                None => value.to_vec(),
            };
            store.set(key, &combined)?;
            Ok(combined)
        })?;
        self.log(UlogOp::Set, key, &combined)?;
        self.touch();
        Ok(())
    }

    /// Removes every record.
    pub fn clear(&self) -> Result<()> {
        self.check_writable()?;
        self.with_store_mut(|store| store.clear())?;
        self.log(UlogOp::Clear, b"", b"")?;
        self.touch();
        Ok(())
    }

    // ---- atomics ------------------------------------------------------

    /// Atomically replaces the record state if it matches `expected`.
    ///
    /// `None` is the absent sentinel on both sides: expecting `None`
    /// means "the record must not exist", storing `None` removes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] carrying the actual stored value when
    /// the expectation does not hold.
    pub fn compare_exchange(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        desired: Option<&[u8]>,
    ) -> Result<()> {
        self.check_writable()?;
        let _guard = self.inner.locks.lock_key(key);
        let logged = self.with_store_mut(|store| {
            let actual = store.get(key)?;
            if actual.as_deref() != expected {
                return Err(Error::mismatch(actual));
            }
            match desired {
                Some(value) => {
                    store.set(key, value)?;
                    Ok(Some((UlogOp::Set, value.to_vec())))
                }
                None => {
                    if store.remove(key)? {
                        Ok(Some((UlogOp::Remove, Vec::new())))
                    } else {
                        Ok(None)
                    }
                }
            }
        })?;
        if let Some((op, value)) = logged {
            self.log(op, key, &value)?;
            self.touch();
        }
        Ok(())
    }

    /// Atomically adds `delta` to a numeric record, treating the value as
    /// decimal text. An absent record starts at `initial`. Returns the
    /// new value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the stored value is not
    /// decimal text, or when the addition overflows `i64`.
    pub fn increment(&self, key: &[u8], delta: i64, initial: i64) -> Result<i64> {
        self.check_writable()?;
        let _guard = self.inner.locks.lock_key(key);
        let (new, text) = self.with_store_mut(|store| {
            let current = match store.get(key)? {
                Some(raw) => std::str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .ok_or_else(|| {
                        Error::invalid_argument("existing value is not decimal text")
                    })?,
                None => initial,
            };
            let new = current
                .checked_add(delta)
                .ok_or_else(|| Error::invalid_argument("increment overflows i64"))?;
            let text = new.to_string();
            store.set(key, text.as_bytes())?;
            Ok((new, text))
        })?;
        self.log(UlogOp::Set, key, text.as_bytes())?;
        self.touch();
        Ok(new)
    }

    /// Atomically applies a batch of writes if every expectation holds.
    ///
    /// All expectations are checked under the locks before any write is
    /// applied, so a failure leaves the database untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mismatch`] carrying the first mismatching
    /// record's actual value.
    pub fn compare_exchange_multi(
        &self,
        expected: &[(&[u8], Option<&[u8]>)],
        desired: &[(&[u8], Option<&[u8]>)],
    ) -> Result<()> {
        self.check_writable()?;
        let keys = expected
            .iter()
            .map(|(k, _)| *k)
            .chain(desired.iter().map(|(k, _)| *k));
        let _guards = self.inner.locks.lock_keys(keys);

        let logged = self.with_store_mut(|store| {
            for (key, want) in expected {
                let actual = store.get(key)?;
                if actual.as_deref() != *want {
                    return Err(Error::mismatch(actual));
                }
            }
            let mut logged = Vec::with_capacity(desired.len());
            for (key, value) in desired {
                match value {
                    Some(value) => {
                        store.set(key, value)?;
                        logged.push((UlogOp::Set, key.to_vec(), value.to_vec()));
                    }
                    None => {
                        if store.remove(key)? {
                            logged.push((UlogOp::Remove, key.to_vec(), Vec::new()));
                        }
                    }
                }
            }
            Ok(logged)
        })?;
        for (op, key, value) in &logged {
            self.log(*op, key, value)?;
        }
        if !logged.is_empty() {
            self.touch();
        }
        Ok(())
    }

    /// Atomically moves a record to a new key.
    ///
    /// With `overwrite` false, an existing record at `new_key` fails with
    /// [`Error::Mismatch`] carrying its value. With `copying` true the
    /// old record is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when `old_key` has no record.
    pub fn rekey(&self, old_key: &[u8], new_key: &[u8], overwrite: bool, copying: bool) -> Result<()> {
        self.check_writable()?;
        let _guards = self.inner.locks.lock_keys([old_key, new_key]);
        let (value, removed) = self.with_store_mut(|store| {
            let value = store.get(old_key)?.ok_or(Error::NotFound)?;
            if !overwrite {
                if let Some(existing) = store.get(new_key)? {
                    return Err(Error::mismatch(Some(existing)));
                }
            }
            store.set(new_key, &value)?;
            let removed = if copying {
                false
            } else {
                store.remove(old_key)?
            };
            Ok((value, removed))
        })?;
        self.log(UlogOp::Set, new_key, &value)?;
        if removed {
            self.log(UlogOp::Remove, old_key, b"")?;
        }
        self.touch();
        Ok(())
    }

    // ---- record processor protocol ------------------------------------

    /// Runs a processor over one record under its lock and applies the
    /// reply atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when a read-only invocation
    /// (`writable` false) replies with a mutation, or the processor's own
    /// error.
    pub fn process(&self, key: &[u8], writable: bool, mut proc: impl RecordProcessor) -> Result<()> {
        if writable {
            self.check_writable()?;
        }
        let _guard = self.inner.locks.lock_key(key);
        self.process_locked(key, writable, &mut proc)
    }

    /// Runs a processor over each of `keys`, each under its lock.
    ///
    /// Records are processed independently in the given order; an error
    /// stops the batch but already-applied records stay applied.
    pub fn process_multi(
        &self,
        keys: &[&[u8]],
        writable: bool,
        mut proc: impl RecordProcessor,
    ) -> Result<()> {
        if writable {
            self.check_writable()?;
        }
        let _guards = self.inner.locks.lock_keys(keys.iter().copied());
        for key in keys {
            self.process_locked(key, writable, &mut proc)?;
        }
        Ok(())
    }

    /// Runs a processor over the enumeration-first record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the database is empty.
    pub fn process_first(&self, writable: bool, mut proc: impl RecordProcessor) -> Result<()> {
        if writable {
            self.check_writable()?;
        }
        let key = self
            .with_store(|store| store.first_key())?
            .ok_or(Error::NotFound)?;
        let _guard = self.inner.locks.lock_key(&key);
        self.process_locked(&key, writable, &mut proc)
    }

    /// Runs a processor over every record.
    ///
    /// The key set is snapshotted up front; each record is then processed
    /// independently under its lock. The processor may stop the scan
    /// early by returning [`Error::Cancelled`], which is not an error of
    /// the scan itself.
    pub fn process_each(&self, writable: bool, mut proc: impl RecordProcessor) -> Result<()> {
        if writable {
            self.check_writable()?;
        }
        let mut keys = Vec::new();
        self.with_store(|store| {
            store.for_each(&mut |key, _| {
                keys.push(key.to_vec());
                Ok(true)
            })
        })?;
        for key in &keys {
            let _guard = self.inner.locks.lock_key(key);
            match self.process_locked(key, writable, &mut proc) {
                Ok(()) => {}
                Err(Error::Cancelled) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn process_locked(
        &self,
        key: &[u8],
        writable: bool,
        proc: &mut impl RecordProcessor,
    ) -> Result<()> {
        let logged = self.with_store_mut(|store| {
            let current = store.get(key)?;
            let reply = proc(key, current.as_deref())?;
            if !writable && !matches!(reply, Reply::Noop) {
                return Err(Error::invalid_argument(
                    "read-only processor replied with a mutation",
                ));
            }
            match reply {
                Reply::Noop => Ok(None),
                Reply::Set(value) => {
                    store.set(key, &value)?;
                    Ok(Some((UlogOp::Set, value)))
                }
                Reply::Remove => {
                    if store.remove(key)? {
                        Ok(Some((UlogOp::Remove, Vec::new())))
                    } else {
                        Ok(None)
                    }
                }
            }
        })?;
        if let Some((op, value)) = logged {
            self.log(op, key, &value)?;
            self.touch();
        }
        Ok(())
    }

    // ---- whole-database operations ------------------------------------

    /// Returns the number of live records.
    pub fn count(&self) -> Result<u64> {
        self.with_store(|store| store.count())
    }

    /// The backing file path, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        self.inner.path.clone()
    }

    /// On-disk size in bytes; 0 for in-memory backends.
    pub fn file_size(&self) -> Result<u64> {
        self.with_store(|store| store.file_size())
    }

    /// The last modification time seen through this handle.
    pub fn timestamp(&self) -> Result<SystemTime> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        Ok(*self.inner.timestamp.read())
    }

    /// Implementation metadata as string pairs: the backend's own
    /// records plus the handle's configuration.
    pub fn inspect(&self) -> Result<Vec<(String, String)>> {
        self.with_store(|store| {
            let mut pairs = store.inspect();
            if let Some(path) = &self.inner.path {
                pairs.push(("path".into(), path.display().to_string()));
            }
            pairs.push(("writable".into(), self.inner.opts.writable.to_string()));
            for (key, value) in &self.inner.opts.tuning {
                pairs.push((key.clone(), value.clone()));
            }
            for (key, value) in &self.inner.opts.extra {
                pairs.push((key.clone(), value.clone()));
            }
            Ok(pairs)
        })
    }

    /// Flushes state to durable storage. `hard` reaches the device.
    pub fn sync(&self, hard: bool) -> Result<()> {
        self.check_writable()?;
        self.with_store_mut(|store| store.sync(hard))?;
        if let Some(ulog) = &self.inner.ulog {
            ulog.sync(hard)?;
        }
        Ok(())
    }

    /// Whether a rebuild would reclaim meaningful space. Never blocks
    /// writers.
    pub fn should_be_rebuilt(&self) -> Result<bool> {
        self.with_store(|store| store.should_rebuild())
    }

    /// Compacts the backend in place. Logical content is unchanged.
    pub fn rebuild(&self) -> Result<()> {
        self.check_writable()?;
        self.with_store_mut(|store| store.rebuild())
    }

    /// Rebuilds with tuning overrides (`num_buckets`, `align_pow` for the
    /// hash backend). Unknown keys are ignored.
    pub fn rebuild_with(&self, params: &BTreeMap<String, String>) -> Result<()> {
        self.check_writable()?;
        self.with_store_mut(|store| store.rebuild_with(params))
    }

    /// Searches keys by pattern. See [`crate::search::SearchMode`] for
    /// the mode names.
    pub fn search(&self, mode: &str, pattern: &[u8], capacity: usize) -> Result<Vec<Vec<u8>>> {
        crate::search::search(self, mode, pattern, capacity)
    }

    /// Creates a cursor over this database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for unordered backends.
    pub fn cursor(&self) -> Result<crate::cursor::Cursor> {
        crate::cursor::Cursor::new(self.clone())
    }

    /// Visits every record in backend enumeration order. The visitor
    /// returns `Ok(false)` to stop early.
    pub(crate) fn scan(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>) -> Result<()> {
        self.with_store(|store| store.for_each(visit))
    }
}
