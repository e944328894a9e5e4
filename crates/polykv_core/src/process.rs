//! Record processor protocol.
//!
//! A processor is a short-lived closure handed to `process`,
//! `process_multi`, `process_first`, or `process_each`. It is invoked
//! synchronously with the relevant record lock held and sees the record
//! as `(key, current_value)` where `None` means the key is absent. The
//! reply is applied before the lock is released, so no other caller
//! observes an intermediate state.
//!
//! Processors are never stored or shared beyond the call that received
//! them.

use crate::error::Result;

/// What a processor wants done with the record it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Leave the record unchanged.
    Noop,
    /// Delete the record. A no-op if the record was absent.
    Remove,
    /// Replace (or create) the record with this value.
    Set(Vec<u8>),
}

/// A record processor callback.
///
/// Invoked as `processor(key, value)` where `value` is `None` for an
/// absent record. Returning `Err` aborts the current record's operation
/// without side effects; returning `Err(Error::Cancelled)` is the
/// sanctioned way to stop a long scan early.
pub trait RecordProcessor: FnMut(&[u8], Option<&[u8]>) -> Result<Reply> {}

impl<F: FnMut(&[u8], Option<&[u8]>) -> Result<Reply>> RecordProcessor for F {}
