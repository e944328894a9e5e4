//! Error types for the polykv engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,

    /// A compare-exchange expectation did not match the stored state.
    ///
    /// Carries the actual value found, or `None` if the record was absent.
    #[error("compare-exchange mismatch")]
    Mismatch {
        /// The value actually stored, or `None` for an absent record.
        actual: Option<Vec<u8>>,
    },

    /// An operation parameter was malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A cursor was used while unbound or exhausted.
    #[error("cursor is not positioned on a record")]
    InvalidIterator,

    /// A cursor was moved past either bound of the record space.
    #[error("cursor moved out of range")]
    OutOfRange,

    /// The operation is unavailable for the selected backend.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// An I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] polykv_storage::StorageError),

    /// An integrity check failed.
    #[error("corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// The database or cursor handle is closed.
    #[error("database is closed")]
    Closed,

    /// A long-running scan was stopped by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates a mismatch error carrying the actual stored value.
    pub fn mismatch(actual: Option<Vec<u8>>) -> Self {
        Self::Mismatch { actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_carries_actual() {
        let err = Error::mismatch(Some(b"current".to_vec()));
        match err {
            Error::Mismatch { actual } => assert_eq!(actual, Some(b"current".to_vec())),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn display_names_the_problem() {
        let err = Error::invalid_argument("unknown search mode: fuzzy");
        assert_eq!(
            err.to_string(),
            "invalid argument: unknown search mode: fuzzy"
        );
    }
}
