//! Keyed byte stores that archives are persisted to.
//!
//! Archives are large and produced by a synchronous encoder, so besides whole
//! object reads and writes a store hands out blocking [`Read`]/[`Write`]
//! handles that the caller drives from a blocking task.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use async_trait::async_trait;
use std::io::{Read, Write};
use std::path::Path;

pub type BoxSyncRead = Box<dyn Read + Send + 'static>;
pub type BoxSyncWrite = Box<dyn Write + Send + 'static>;

/// Object-safe store of byte objects addressed by relative keys.
///
/// Keys pass through [`validate_path`](crate::validate_path) inside every
/// implementation, so callers may hand over untrusted keys and get
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath) back.
///
/// Missing objects are reported as
/// [`NotFound`](crate::error::ErrorKind::NotFound) by `read`, `reader`,
/// `delete` and by `rename` for its source. Operations that create objects
/// create any intermediate directories themselves.
///
/// ```
/// use std::path::Path;
/// use webstash_storage::{backend::StorageBackend, error::Result};
///
/// async fn replace(store: &dyn StorageBackend, staged: &Path, key: &Path) -> Result<bool> {
///     if !store.exists(staged).await? {
///         return Ok(false);
///     }
///     store.rename(staged, key).await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Label for log output.
    fn name(&self) -> &str;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open an object for reading from blocking code.
    ///
    /// The object is opened before this returns, so a missing object fails
    /// here rather than on the first `read`.
    ///
    /// ```no_run
    /// use std::io::Read;
    /// use std::path::Path;
    /// # use webstash_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(store: &dyn StorageBackend) -> Result<()> {
    /// let mut reader = store.reader(Path::new("archives/paywall.mht")).await?;
    /// let text = tokio::task::spawn_blocking(move || {
    ///     let mut text = String::new();
    ///     reader.read_to_string(&mut text).map(|_| text)
    /// });
    /// # Ok(())
    /// # }
    /// ```
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Create or replace an object.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Open an object for writing from blocking code.
    ///
    /// Bytes written are only guaranteed to be stored, and write errors to be
    /// reported, once `flush()` returns. A writer dropped without a flush may
    /// leave nothing behind.
    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite>;

    async fn delete(&self, path: &Path) -> Result<()>;

    /// Move an object to a new key, replacing whatever was stored there.
    ///
    /// Readers of `to` observe either the old object or the complete new one.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}
