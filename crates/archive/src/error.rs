//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Decoding deliberately has almost no error surface: malformed archives
//! degrade to partial results. What is left is I/O on the sink or source.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Writing to the sink or reading from the source failed.
    #[display("I/O error")]
    Io,
    /// The background encoder thread could not be started.
    #[display("failed to start archive pipe")]
    Pipe,
    /// Encoded output was not valid UTF-8.
    #[display("invalid archive data")]
    InvalidData,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io | ErrorKind::Pipe)
    }
}
