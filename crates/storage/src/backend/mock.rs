//! In-memory store for tests.

use super::{BoxSyncRead, BoxSyncWrite};
use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, validate_path};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type Objects = Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>;

fn lock(objects: &Objects) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
    // A panicking test thread must not hide the objects from the assertions after it.
    objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Store keeping every object in memory.
///
/// Streaming writers stage their bytes and publish them on `flush()`, so a
/// writer dropped mid-archive leaves no object behind, like an interrupted
/// upload.
///
/// ```
/// use std::path::{Path, PathBuf};
/// use webstash_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MockBackend::with_files([("archives/p1.mht", "--boundary--")]);
/// store.write(Path::new("archives/p0.mht"), b"").await.unwrap();
/// assert_eq!(store.keys().await, [PathBuf::from("archives/p0.mht"), PathBuf::from("archives/p1.mht")]);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    objects: Objects,
}

impl MockBackend {
    /// Pre-populate the store.
    ///
    /// Panics on a key that fails validation, so a mistyped fixture cannot
    /// silently turn into a passing test.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let objects = files
            .into_iter()
            .map(|(key, data)| {
                let key = key.into();
                match validate_path(&key) {
                    Ok(validated) => (validated, data.into()),
                    Err(_) => panic!("invalid path in fixture: {}", key.display()),
                }
            })
            .collect();
        Self {
            name: "mock".to_string(),
            objects: Arc::new(Mutex::new(objects)),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every stored key, in order.
    pub async fn keys(&self) -> Vec<PathBuf> {
        lock(&self.objects).keys().cloned().collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(Vec::<(PathBuf, Vec<u8>)>::new())
    }
}

struct StagedWriter {
    key: PathBuf,
    staged: Vec<u8>,
    objects: Objects,
}

impl Write for StagedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staged.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.objects).insert(self.key.clone(), self.staged.clone());
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = validate_path(path)?;
        Ok(lock(&self.objects).contains_key(&key))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = validate_path(path)?;
        match lock(&self.objects).get(&key) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(key)),
        }
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        Ok(Box::new(Cursor::new(self.read(path).await?)))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = validate_path(path)?;
        lock(&self.objects).insert(key, data.to_vec());
        Ok(())
    }

    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        Ok(Box::new(StagedWriter {
            key: validate_path(path)?,
            staged: Vec::new(),
            objects: Arc::clone(&self.objects),
        }))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let key = validate_path(path)?;
        match lock(&self.objects).remove(&key) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(key)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let (source, target) = (validate_path(from)?, validate_path(to)?);
        let mut objects = lock(&self.objects);
        let Some(data) = objects.remove(&source) else {
            exn::bail!(ErrorKind::NotFound(source));
        };
        objects.insert(target, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn fixtures_are_normalised() {
        let store = MockBackend::with_files([("/archives//p1.mht", "a"), ("archives/./p2.mht", "b")]);
        assert_eq!(store.keys().await, [PathBuf::from("archives/p1.mht"), PathBuf::from("archives/p2.mht")]);
        assert_eq!(store.read(Path::new("archives/p2.mht")).await.unwrap(), b"b");
        assert_eq!(store.with_name("fixtures").name(), "fixtures");
    }

    #[tokio::test]
    async fn staged_writes_publish_on_flush() {
        let store = MockBackend::default();
        let key = Path::new("archives/p1.mht.partial");
        let mut writer = store.writer(key).await.unwrap();
        writer.write_all(b"--boundary").unwrap();
        assert!(!store.exists(key).await.unwrap());
        writer.flush().unwrap();
        assert_eq!(store.read(key).await.unwrap(), b"--boundary");

        let mut abandoned = store.writer(Path::new("archives/p2.mht.partial")).await.unwrap();
        abandoned.write_all(b"half an archive").unwrap();
        drop(abandoned);
        assert_eq!(store.keys().await, [PathBuf::from("archives/p1.mht.partial")]);
    }

    #[tokio::test]
    async fn clones_share_objects() {
        let store = MockBackend::default();
        store.clone().write(Path::new("p1.mht"), b"x").await.unwrap();
        let mut reader = store.reader(Path::new("p1.mht")).await.unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "x");
    }

    #[tokio::test]
    async fn rename_replaces_and_reports_missing_source() {
        let store = MockBackend::with_files([("archives/p1.mht", "old"), ("archives/p1.mht.partial", "new")]);
        store.rename(Path::new("archives/p1.mht.partial"), Path::new("archives/p1.mht")).await.unwrap();
        assert_eq!(store.keys().await, [PathBuf::from("archives/p1.mht")]);
        assert_eq!(store.read(Path::new("archives/p1.mht")).await.unwrap(), b"new");

        let err = store.rename(Path::new("archives/p1.mht.partial"), Path::new("x")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = store.delete(Path::new("archives/p1.mht.partial")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let store = MockBackend::default();
        assert!(store.write(Path::new("../p1.mht"), b"x").await.is_err());
        assert!(store.writer(Path::new("archives/../../p1.mht")).await.is_err());
        assert!(store.keys().await.is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid path in fixture")]
    fn bad_fixture_panics() {
        MockBackend::with_files([("../p1.mht", "x")]);
    }
}
