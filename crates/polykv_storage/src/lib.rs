//! # polykv storage
//!
//! Byte-store abstraction for polykv.
//!
//! This crate provides the lowest-level storage layer of the engine.
//! A [`StorageFile`] is a flat, addressable sequence of bytes - it has no
//! knowledge of records, buckets, or log entries. The record backends in
//! `polykv_core` own all format interpretation.
//!
//! ## Design principles
//!
//! - Storage is a flat byte space with positional reads and writes
//! - All implementations are `Send + Sync` and internally locked
//! - Durability is explicit: `flush` pushes to the OS, `sync` reaches disk
//!
//! ## Available implementations
//!
//! - [`MemoryStorage`] - for tests and ephemeral databases
//! - [`FileStorage`] - persistent storage over OS file APIs, with an
//!   optional exclusive advisory lock
//!
//! ## Example
//!
//! ```rust
//! use polykv_storage::{StorageFile, MemoryStorage};
//!
//! let storage = MemoryStorage::new();
//! let offset = storage.append(b"hello world").unwrap();
//! let data = storage.read_vec(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod error;
mod file;
mod memory;

pub use api::StorageFile;
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::MemoryStorage;
