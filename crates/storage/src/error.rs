//! Storage Error Types
//!
//! Errors carry the storage key involved where one is known, never the
//! absolute location on disk.

use derive_more::{Display, Error};
use std::io;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing is stored under the key.
    #[display("no object stored at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("access to {} denied", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// The key is empty, escapes the root, or the root itself is unusable.
    #[display("invalid storage key: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    #[display("storage I/O failed: {_0}")]
    Io(io::Error),
    /// Failure specific to one backend implementation.
    #[display("backend failure: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}
