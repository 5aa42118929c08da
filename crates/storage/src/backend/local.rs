//! Filesystem store: one file per object below a root directory.

use super::{BoxSyncRead, BoxSyncWrite};
use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, validate_path};
use async_trait::async_trait;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

fn io_error(key: &Path) -> impl FnOnce(io::Error) -> ErrorKind + '_ {
    move |err| match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_path_buf()),
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_path_buf()),
        _ => ErrorKind::Io(err),
    }
}

/// Stores objects as files below an absolute root directory.
///
/// ```no_run
/// use webstash_storage::backend::LocalBackend;
///
/// # fn example() -> webstash_storage::error::Result<()> {
/// let store = LocalBackend::new("local", "/var/cache/webstash")?;
/// assert!(store.root().is_dir());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// Open the store at `root`, creating the directory when missing.
    ///
    /// A relative `root`, or one naming a file, is
    /// [`InvalidPath`](ErrorKind::InvalidPath).
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_absolute() || root.is_file() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        // Runs once during setup, blocking is fine.
        std::fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, key: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(key)?))
    }

    /// Locate `key` and make sure its directory exists.
    async fn prepare(&self, key: &Path) -> Result<PathBuf> {
        let file = self.locate(key)?;
        if let Some(directory) = file.parent() {
            fs::create_dir_all(directory).await.map_err(io_error(key))?;
        }
        Ok(file)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let file = self.locate(path)?;
        Ok(fs::try_exists(&file).await.map_err(io_error(path))?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let file = self.locate(path)?;
        Ok(fs::read(&file).await.map_err(io_error(path))?)
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let file = fs::File::open(self.locate(path)?).await.map_err(io_error(path))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let file = self.prepare(path).await?;
        Ok(fs::write(&file, data).await.map_err(io_error(path))?)
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        let file = fs::File::create(self.prepare(path).await?).await.map_err(io_error(path))?;
        Ok(Box::new(BufWriter::new(file.into_std().await)))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let file = self.locate(path)?;
        Ok(fs::remove_file(&file).await.map_err(io_error(path))?)
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let source = self.locate(from)?;
        let target = self.prepare(to).await?;
        // Both live under one root, so this is a same-filesystem rename.
        Ok(fs::rename(&source, &target).await.map_err(io_error(from))?)
    }
}
