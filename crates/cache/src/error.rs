//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the downloader and the
//! storage backend are raised into these categories, so the full chain stays
//! available to callers that want it.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The identifier cannot be used as a storage key.
    #[display("invalid archive id: {_0:?}")]
    InvalidId(#[error(not(source))] String),
    /// Fetching the document or one of its resources failed.
    #[display("failed to download archive {_0}")]
    Download(#[error(not(source))] String),
    /// Reading from or writing to the storage backend failed.
    #[display("storage error")]
    Storage,
    /// No archive is stored under the identifier, and none is pending.
    #[display("archive not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Waiting for a pending download took longer than allowed.
    #[display("timed out waiting for archive {_0}")]
    Timeout(#[error(not(source))] String),
    /// Waiting for a pending download was cancelled.
    #[display("cancelled waiting for archive {_0}")]
    Cancelled(#[error(not(source))] String),
    /// The HTTP fetcher could not be built from the configuration.
    #[display("failed to build HTTP fetcher")]
    Client,
    /// A blocking encode/decode task panicked or was aborted.
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download(_) | Self::Storage | Self::Timeout(_))
    }
}
