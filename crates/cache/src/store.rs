use crate::error::{ErrorKind, Result};
use crate::registry::{PendingRegistry, WaitPolicy};
use exn::ResultExt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::instrument;
use webstash_archive::{ArchivePart, WebArchive, decode_reader, write_archive};
use webstash_config::Config;
#[cfg(feature = "http")]
use webstash_manifest::fetch::HttpFetcher;
use webstash_manifest::{FetcherHandle, ManifestDownloader, WebArchiveManifest};
use webstash_storage::backend::LocalBackend;
use webstash_storage::{BackendHandle, validate_path};

const ARCHIVE_DIR: &str = "archives";
const ARCHIVE_EXTENSION: &str = "mht";
const PARTIAL_EXTENSION: &str = "mht.partial";

/// Outcome of [`ArchiveCache::download_manifest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Download {
    /// The archive was downloaded and stored.
    Archived { bytes: u64 },
    /// Another download for the same identifier is in progress; nothing was done.
    AlreadyPending,
}

fn checked_key(id: &str, extension: &str) -> Result<PathBuf> {
    let invalid = || ErrorKind::InvalidId(id.to_string());
    // A single plain segment, so no two ids share a key.
    let mut components = Path::new(id).components();
    if !matches!((components.next(), components.next()), (Some(Component::Normal(name)), None) if name == id) {
        exn::bail!(invalid());
    }
    validate_path(Path::new(ARCHIVE_DIR).join(format!("{id}.{extension}"))).or_raise(invalid)
}

/// Storage key of the archive for `id`.
///
/// ```
/// use std::path::Path;
/// use webstash_cache::archive_key;
///
/// assert_eq!(archive_key("paywall-1").unwrap(), Path::new("archives/paywall-1.mht"));
/// assert!(archive_key("../paywall-1").is_err());
/// assert!(archive_key("a/b").is_err());
/// ```
pub fn archive_key(id: &str) -> Result<PathBuf> {
    checked_key(id, ARCHIVE_EXTENSION)
}

/// Downloads, stores and loads web archives by identifier.
///
/// Cloning is cheap; clones share the backend and the pending registry.
#[derive(Clone)]
pub struct ArchiveCache {
    backend: BackendHandle,
    downloader: ManifestDownloader,
    registry: PendingRegistry,
    policy: WaitPolicy,
}

impl ArchiveCache {
    pub fn new(backend: BackendHandle, downloader: ManifestDownloader) -> Self {
        Self {
            backend,
            downloader,
            registry: PendingRegistry::default(),
            policy: WaitPolicy::default(),
        }
    }

    /// Bound how long [`load_archive`](Self::load_archive) and
    /// [`await_until_resolved`](Self::await_until_resolved) wait.
    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build a cache on the local filesystem at `config.storage_root`.
    pub fn from_config(config: &Config, fetcher: FetcherHandle) -> Result<Self> {
        let backend = LocalBackend::new("local", &config.storage_root).or_raise(|| ErrorKind::Storage)?;
        let downloader = ManifestDownloader::new(fetcher).with_concurrency(config.max_concurrent_fetches);
        let policy = WaitPolicy {
            timeout: config.wait_timeout(),
            cancel: None,
        };
        Ok(Self::new(Arc::new(backend), downloader).with_wait_policy(policy))
    }

    /// [`from_config`](Self::from_config) with an HTTP fetcher sending
    /// `config.user_agent`.
    #[cfg(feature = "http")]
    pub fn from_config_with_http(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.user_agent.as_deref()).or_raise(|| ErrorKind::Client)?;
        Self::from_config(config, Arc::new(fetcher))
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.registry.is_pending(id)
    }

    /// Download `manifest` (or just the document at `url` when there is no
    /// manifest) and store it as the archive for `id`.
    ///
    /// Returns [`Download::AlreadyPending`] without doing anything if a
    /// download for `id` is already running. On failure nothing is left
    /// behind in storage.
    #[instrument(skip(self, manifest), fields(backend = %self.backend.name(), bytes))]
    pub async fn download_manifest(
        &self,
        id: &str,
        url: &str,
        manifest: Option<&WebArchiveManifest>,
    ) -> Result<Download> {
        let key = archive_key(id)?;
        let partial = checked_key(id, PARTIAL_EXTENSION)?;
        let Some(_guard) = self.registry.try_begin(id) else {
            tracing::debug!("download already pending");
            return Ok(Download::AlreadyPending);
        };

        let single;
        let manifest = match manifest {
            Some(manifest) => manifest,
            None => {
                single = WebArchiveManifest::single_document(url);
                &single
            },
        };
        let parts = self.downloader.download(id, manifest).await.or_raise(|| ErrorKind::Download(id.to_string()))?;

        let bytes = match self.persist(url, parts, &partial, &key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(cleanup) = self.backend.delete(&partial).await {
                    tracing::debug!(key = %partial.display(), error = ?cleanup, "partial archive not removed");
                }
                return Err(err);
            },
        };
        tracing::Span::current().record("bytes", bytes);
        tracing::info!("archive stored");
        Ok(Download::Archived { bytes })
    }

    async fn persist(&self, url: &str, parts: Vec<ArchivePart>, partial: &Path, key: &Path) -> Result<u64> {
        let mut writer = self.backend.writer(partial).await.or_raise(|| ErrorKind::Storage)?;
        let url = url.to_string();
        let bytes = spawn_blocking(move || -> Result<u64> {
            let bytes = write_archive(&url, &parts, &mut writer).or_raise(|| ErrorKind::Storage)?;
            writer.flush().or_raise(|| ErrorKind::Storage)?;
            Ok(bytes)
        })
        .await
        .or_raise(|| ErrorKind::Task)??;
        self.backend.rename(partial, key).await.or_raise(|| ErrorKind::Storage)?;
        Ok(bytes)
    }

    /// Whether an archive is stored for `id`. Never waits.
    #[instrument(skip(self))]
    pub async fn is_archived(&self, id: &str) -> Result<bool> {
        let key = archive_key(id)?;
        self.backend.exists(&key).await.or_raise(|| ErrorKind::Storage)
    }

    /// Load and decode the archive for `id`.
    ///
    /// If it is not stored yet but a download is pending, waits for that
    /// download under the configured [`WaitPolicy`] first.
    #[instrument(skip(self), fields(parts))]
    pub async fn load_archive(&self, id: &str) -> Result<WebArchive> {
        let key = archive_key(id)?;
        if !self.is_archived(id).await? {
            self.registry.await_finish(id, &self.policy).await?;
            if !self.is_archived(id).await? {
                exn::bail!(ErrorKind::NotFound(id.to_string()));
            }
        }

        let reader = self.backend.reader(&key).await.or_raise(|| ErrorKind::Storage)?;
        let archive = spawn_blocking(move || decode_reader(reader))
            .await
            .or_raise(|| ErrorKind::Task)?
            .or_raise(|| ErrorKind::Storage)?;
        tracing::Span::current().record("parts", archive.parts().len());
        Ok(archive)
    }

    /// Wait until no download for `id` is pending.
    pub async fn await_until_resolved(&self, id: &str) -> Result<()> {
        self.registry.await_finish(id, &self.policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use webstash_archive::{PartKind, encode};
    use webstash_manifest::ResourceSpec;
    use webstash_manifest::fetch::MockFetcher;
    use async_trait::async_trait;
    use std::io;
    use webstash_storage::StorageBackend;
    use webstash_storage::backend::{BoxSyncRead, BoxSyncWrite, MockBackend};
    use webstash_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};

    const URL: &str = "https://paywalls.example.com/p/1";
    const DOCUMENT: &str = r#"<html><script src="/runtime/app.js"></script></html>"#;

    fn fetcher() -> MockFetcher {
        MockFetcher::default()
            .with_response(URL, "text/html", DOCUMENT)
            .with_response("https://paywalls.example.com/runtime/app.js", "text/javascript", "run()")
            .with_response("https://paywalls.example.com/favicon.ico", "image/x-icon", vec![0u8, 1, 2])
    }

    fn cache(backend: &Arc<MockBackend>, fetcher: &Arc<MockFetcher>) -> ArchiveCache {
        ArchiveCache::new(backend.clone(), ManifestDownloader::new(fetcher.clone()))
    }

    #[derive(Debug, Clone, Copy)]
    enum Fault {
        /// Every write publishes what it was given, then fails.
        Write,
        Rename,
    }

    /// Wraps a [`MockBackend`], failing one kind of operation.
    struct FaultyBackend {
        inner: MockBackend,
        fault: Fault,
    }

    struct FailingWriter(BoxSyncWrite);

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write_all(buf)?;
            self.0.flush()?;
            Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

    #[async_trait]
    impl StorageBackend for FaultyBackend {
        fn name(&self) -> &str {
            "faulty"
        }

        async fn exists(&self, path: &Path) -> StorageResult<bool> {
            self.inner.exists(path).await
        }

        async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
            self.inner.read(path).await
        }

        async fn reader(&self, path: &Path) -> StorageResult<BoxSyncRead> {
            self.inner.reader(path).await
        }

        async fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
            self.inner.write(path, data).await
        }

        async fn writer(&self, path: &Path) -> StorageResult<BoxSyncWrite> {
            let writer = self.inner.writer(path).await?;
            Ok(match self.fault {
                Fault::Write => Box::new(FailingWriter(writer)),
                Fault::Rename => writer,
            })
        }

        async fn delete(&self, path: &Path) -> StorageResult<()> {
            self.inner.delete(path).await
        }

        async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
            match self.fault {
                Fault::Rename => exn::bail!(StorageErrorKind::BackendError("rename refused".to_string())),
                Fault::Write => self.inner.rename(from, to).await,
            }
        }
    }

    #[tokio::test]
    async fn download_then_load() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher());
        let cache = cache(&backend, &fetcher);

        assert!(!cache.is_archived("p1").await.unwrap());
        let outcome = cache.download_manifest("p1", URL, None).await.unwrap();
        let Download::Archived { bytes } = outcome else {
            panic!("expected an archive, got {outcome:?}");
        };
        assert!(bytes > 0);
        assert_eq!(backend.keys().await, vec![PathBuf::from("archives/p1.mht")]);
        assert!(cache.is_archived("p1").await.unwrap());
        assert!(!cache.is_pending("p1"));

        let archive = cache.load_archive("p1").await.unwrap();
        let summary: Vec<_> = archive.parts().iter().map(|p| (p.kind, p.url.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (PartKind::Document, URL),
                (PartKind::Resource, "/runtime/app.js"),
                (PartKind::Resource, "/favicon.ico"),
            ]
        );
        assert_eq!(archive.document().unwrap().content, DOCUMENT.as_bytes());
        assert_eq!(archive.parts()[2].content, vec![0u8, 1, 2]);
        assert_eq!(archive.snapshot_location(), Some(URL));
    }

    #[tokio::test]
    async fn declared_resources_are_archived() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher().with_response("https://cdn.example.com/f.woff2", "font/woff2", "font"));
        let manifest = WebArchiveManifest {
            resources: vec![ResourceSpec::new("https://cdn.example.com/f.woff2", "font/woff2")],
            ..WebArchiveManifest::single_document(URL)
        };
        cache(&backend, &fetcher).download_manifest("p1", URL, Some(&manifest)).await.unwrap();
        let archive = cache(&backend, &fetcher).load_archive("p1").await.unwrap();
        assert!(archive.resources().any(|p| p.url == "https://cdn.example.com/f.woff2" && p.content == b"font"));
    }

    #[tokio::test]
    async fn load_from_storage_never_fetches() {
        let parts = vec![ArchivePart::document(URL, "text/html", DOCUMENT)];
        let backend = Arc::new(MockBackend::with_files([("archives/p1.mht", encode(URL, &parts).unwrap())]));
        let fetcher = Arc::new(MockFetcher::default());
        let archive = cache(&backend, &fetcher).load_archive("p1").await.unwrap();
        assert_eq!(archive.parts(), parts.as_slice());
        assert_eq!(fetcher.total_calls().await, 0);
    }

    #[tokio::test]
    async fn concurrent_downloads_are_collapsed() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher().with_delay(Duration::from_millis(10)));
        let cache = cache(&backend, &fetcher);

        let (first, second, loaded) = tokio::join!(
            cache.download_manifest("p1", URL, None),
            cache.download_manifest("p1", URL, None),
            cache.load_archive("p1"),
        );
        assert!(matches!(first.unwrap(), Download::Archived { .. }));
        assert_eq!(second.unwrap(), Download::AlreadyPending);
        assert_eq!(loaded.unwrap().document().unwrap().content, DOCUMENT.as_bytes());
        assert_eq!(fetcher.calls(URL).await, 1);
    }

    #[tokio::test]
    async fn await_until_resolved_follows_the_download() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher().with_delay(Duration::from_millis(10)));
        let cache = cache(&backend, &fetcher);

        cache.await_until_resolved("p1").await.unwrap();
        let (downloaded, resolved) =
            tokio::join!(cache.download_manifest("p1", URL, None), cache.await_until_resolved("p1"));
        downloaded.unwrap();
        resolved.unwrap();
        assert!(cache.is_archived("p1").await.unwrap());
    }

    #[tokio::test]
    async fn failed_download_stores_nothing() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher().with_failure("https://paywalls.example.com/runtime/app.js"));
        let cache = cache(&backend, &fetcher);

        let err = cache.download_manifest("p1", URL, None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Download("p1".to_string()));
        assert!(backend.keys().await.is_empty());
        assert!(!cache.is_pending("p1"));
        assert_eq!(*cache.load_archive("p1").await.unwrap_err(), ErrorKind::NotFound("p1".to_string()));
    }

    #[rstest]
    #[case(Fault::Write)]
    #[case(Fault::Rename)]
    #[tokio::test]
    async fn storage_failure_removes_the_partial_archive(#[case] fault: Fault) {
        let inner = MockBackend::default();
        let backend = Arc::new(FaultyBackend {
            inner: inner.clone(),
            fault,
        });
        let fetcher = Arc::new(fetcher());
        let cache = ArchiveCache::new(backend, ManifestDownloader::new(fetcher.clone()));

        let err = cache.download_manifest("p1", URL, None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Storage);
        assert!(inner.keys().await.is_empty(), "left behind: {:?}", inner.keys().await);
        assert!(!cache.is_pending("p1"));
        assert!(!cache.is_archived("p1").await.unwrap());

        // The id is free again once the failure is reported.
        let err = cache.download_manifest("p1", URL, None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Storage);
        assert_eq!(fetcher.calls(URL).await, 2);
    }

    #[tokio::test]
    async fn missing_archive_is_not_found() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(MockFetcher::default());
        let err = cache(&backend, &fetcher).load_archive("p1").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("p1".to_string()));
    }

    #[tokio::test]
    async fn load_wait_times_out() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&backend, &fetcher)
            .with_wait_policy(WaitPolicy::default().with_timeout(Duration::from_millis(20)));
        let _guard = cache.registry().try_begin("p1").unwrap();
        let err = cache.load_archive("p1").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Timeout("p1".to_string()));
    }

    #[tokio::test]
    async fn load_wait_can_be_cancelled() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(MockFetcher::default());
        let token = CancellationToken::new();
        token.cancel();
        let cache = cache(&backend, &fetcher).with_wait_policy(WaitPolicy::default().with_cancellation(token));
        let _guard = cache.registry().try_begin("p1").unwrap();
        let err = cache.load_archive("p1").await.unwrap_err();
        assert_eq!(*err, ErrorKind::Cancelled("p1".to_string()));
    }

    #[tokio::test]
    async fn pending_download_is_not_repeated() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher());
        let cache = cache(&backend, &fetcher);
        let guard = cache.registry().try_begin("p1").unwrap();
        assert_eq!(cache.download_manifest("p1", URL, None).await.unwrap(), Download::AlreadyPending);
        assert_eq!(fetcher.total_calls().await, 0);
        drop(guard);
        assert!(matches!(cache.download_manifest("p1", URL, None).await.unwrap(), Download::Archived { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("../p1")]
    #[case("a/b")]
    #[case("./p1")]
    #[case("/p1")]
    #[case("p1/")]
    #[tokio::test]
    async fn invalid_ids_are_rejected(#[case] id: &str) {
        let backend = Arc::new(MockBackend::default());
        let fetcher = Arc::new(fetcher());
        let cache = cache(&backend, &fetcher);
        let err = cache.download_manifest(id, URL, None).await.unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidId(id.to_string()));
        assert!(matches!(&*cache.load_archive(id).await.unwrap_err(), ErrorKind::InvalidId(_)));
        assert_eq!(fetcher.total_calls().await, 0);
    }

    #[tokio::test]
    async fn from_config_uses_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_root: dir.path().join("store"),
            max_concurrent_fetches: 2,
            wait_timeout_secs: Some(1),
            ..Config::default()
        };
        let cache = ArchiveCache::from_config(&config, Arc::new(fetcher())).unwrap();
        cache.download_manifest("p1", URL, None).await.unwrap();
        assert!(dir.path().join("store/archives/p1.mht").is_file());
        assert!(!dir.path().join("store/archives/p1.mht.partial").exists());
        assert_eq!(cache.load_archive("p1").await.unwrap().parts().len(), 3);
    }

    #[cfg(feature = "http")]
    #[test]
    fn http_fetcher_uses_configured_user_agent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_root: dir.path().to_path_buf(),
            user_agent: Some("webstash-test/1.0".to_string()),
            ..Config::default()
        };
        let cache = ArchiveCache::from_config_with_http(&config).unwrap();
        assert!(!cache.is_pending("p1"));

        let config = Config {
            user_agent: Some("webstash\n1.0".to_string()),
            ..config
        };
        let err = ArchiveCache::from_config_with_http(&config).err().unwrap();
        assert_eq!(*err, ErrorKind::Client);
    }
}
