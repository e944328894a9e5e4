//! # polykv
//!
//! An embeddable, synchronous key-value engine with interchangeable
//! storage backends behind one facade.
//!
//! A [`Dbm`] handle binds a backend class selected at open time - on-disk
//! hash table, on-disk ordered tree, append-friendly skip file, or their
//! in-memory counterparts - and exposes the same operation set over all
//! of them: atomic single-record updates, multi-record compare-exchange,
//! a record processor protocol, pattern search, and flat-record
//! export/import. Ordered backends additionally support [`Cursor`]
//! iteration, range seeks, and the [`Index`] secondary-index layer.
//! Every mutation can be mirrored to a rotating update log for
//! point-in-time [`restore_database`] recovery.
//!
//! ## Example
//!
//! ```no_run
//! use polykv_core::{BackendClass, Dbm, OpenOptions};
//!
//! let db = Dbm::open("catalog.pkt", OpenOptions::default().class(BackendClass::Tree))?;
//! db.set(b"sku-1000", b"anvil")?;
//!
//! let cursor = db.cursor()?;
//! cursor.jump(b"sku-")?;
//! let (key, value) = cursor.get()?;
//! assert_eq!(key, b"sku-1000");
//! assert_eq!(value, b"anvil");
//! db.close()?;
//! # Ok::<(), polykv_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
mod comparator;
mod config;
mod cursor;
mod dbm;
mod error;
mod export;
mod index;
mod locks;
mod process;
mod restore;
mod search;
pub mod ulog;
mod wire;

pub use comparator::KeyComparator;
pub use config::{BackendClass, Compression, OpenOptions, UlogOptions};
pub use cursor::Cursor;
pub use dbm::Dbm;
pub use error::{Error, Result};
pub use export::{export_flat_records, export_keys_as_lines, import_flat_records};
pub use index::{Index, IndexCursor};
pub use process::{RecordProcessor, Reply};
pub use restore::restore_database;
pub use search::SearchMode;
