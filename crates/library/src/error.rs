//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every operation fails with one of
//! four kinds, which is all a caller (the HTTP layer, mostly) needs in order
//! to pick a response.

use cirrus_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The client sent a path (or name) that can't be used.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Nothing exists at the requested path.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The destination is occupied by something that can't be replaced,
    /// such as a folder with contents.
    #[display("already exists: {_0}")]
    Conflict(#[error(not(source))] String),
    /// The filesystem refuses the server access; retrying won't help.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// An upload or folder creation could not be written.
    #[display("write failed")]
    WriteFailed,
    /// The filesystem or the metadata store could not be reached.
    #[display("storage unavailable")]
    StorageUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }

    pub(crate) fn invalid(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }
}

/// Raises a storage error as the library kind a caller can act on.
///
/// Client mistakes and permanent refusals keep their meaning; anything else
/// the filesystem does wrong becomes `fallback`.
#[track_caller]
pub(crate) fn from_storage(err: StorageError, fallback: ErrorKind) -> Error {
    let kind = match &*err {
        StorageErrorKind::InvalidPath(path) => ErrorKind::InvalidPath(path.clone()),
        StorageErrorKind::NotFound(path) => ErrorKind::NotFound(path.display().to_string()),
        StorageErrorKind::WrongType(path) => ErrorKind::InvalidPath(path.display().to_string()),
        StorageErrorKind::AlreadyExists(path) => ErrorKind::Conflict(path.display().to_string()),
        StorageErrorKind::PermissionDenied(path) => ErrorKind::PermissionDenied(path.display().to_string()),
        _ => fallback,
    };
    err.raise(kind)
}
