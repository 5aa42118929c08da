//! Manifest download orchestration.

use crate::error::{ErrorKind, Result};
use crate::fetch::FetcherHandle;
use crate::model::{ResourceSpec, WebArchiveManifest};
use crate::resolve::{discover_absolute_resources, discover_relative_resources};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::HashMap;
use tracing::instrument;
use url::Url;
use webstash_archive::ArchivePart;

pub const DEFAULT_CONCURRENCY: usize = 10;
const FAVICON_PATH: &str = "favicon.ico";
const FAVICON_MIME_TYPE: &str = "image/x-icon";

/// A URL to fetch for the archive, in the order it was discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    url: String,
    mime_type: String,
    /// Stored without the origin so the archive works under any host.
    host_relative: bool,
}

/// Candidate list with first-wins deduplication by URL.
#[derive(Default)]
struct Candidates {
    list: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl Candidates {
    fn push(&mut self, url: String, mime_type: String, host_relative: bool) {
        match self.index.get(&url) {
            Some(existing) => self.list[*existing].host_relative |= host_relative,
            None => {
                self.index.insert(url.clone(), self.list.len());
                self.list.push(Candidate {
                    url,
                    mime_type,
                    host_relative,
                });
            },
        }
    }
}

/// `https://{host}[:port]` of the document, used to absolutise relative
/// references and the favicon.
fn origin_of(document_url: &str) -> Result<String> {
    let parsed = Url::parse(document_url).or_raise(|| ErrorKind::InvalidUrl(document_url.to_string()))?;
    let Some(host) = parsed.host_str() else {
        exn::bail!(ErrorKind::InvalidUrl(document_url.to_string()));
    };
    Ok(match parsed.port() {
        Some(port) => format!("https://{host}:{port}"),
        None => format!("https://{host}"),
    })
}

fn candidates(origin: &str, document: &str, declared: &[ResourceSpec]) -> Vec<Candidate> {
    let mut candidates = Candidates::default();
    for (url, mime_type) in discover_absolute_resources(document) {
        candidates.push(url, mime_type, false);
    }
    for (path, mime_type) in discover_relative_resources(document) {
        candidates.push(format!("{origin}/{path}"), mime_type, true);
    }
    for resource in declared {
        candidates.push(resource.url.clone(), resource.mime_type.clone(), false);
    }
    candidates.push(format!("{origin}/{FAVICON_PATH}"), FAVICON_MIME_TYPE.to_string(), true);
    candidates.list
}

/// Fetches a manifest's document and every resource it needs.
///
/// # Examples
///
/// ```no_run
/// use webstash_manifest::{FetcherHandle, ManifestDownloader, WebArchiveManifest};
///
/// # async fn example(fetcher: FetcherHandle) -> webstash_manifest::error::Result<()> {
/// let downloader = ManifestDownloader::new(fetcher).with_concurrency(4);
/// let manifest = WebArchiveManifest::single_document("https://example.com/paywall");
/// let parts = downloader.download("paywall", &manifest).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ManifestDownloader {
    fetcher: FetcherHandle,
    concurrency: usize,
}

impl ManifestDownloader {
    pub fn new(fetcher: FetcherHandle) -> Self {
        Self {
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Limit the number of resource fetches in flight. Values below one are
    /// treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download everything `manifest` describes.
    ///
    /// Returns the resources in discovery order (absolute references,
    /// relative references, declared resources, favicon) followed by the
    /// document. Relative references and the favicon are stored with
    /// host-relative URLs. Any failed fetch fails the whole download.
    #[instrument(skip(self, manifest), fields(document = %manifest.document.url, resources))]
    pub async fn download(&self, id: &str, manifest: &WebArchiveManifest) -> Result<Vec<ArchivePart>> {
        let document_url = manifest.document.url.as_str();
        let origin = origin_of(document_url)?;

        let document = self
            .fetcher
            .fetch(document_url)
            .await
            .inspect_err(|err| tracing::debug!(url = document_url, error = ?err, "document fetch failed"))
            .or_raise(|| ErrorKind::Fetch(document_url.to_string()))?;

        let candidates = candidates(&origin, &String::from_utf8_lossy(&document.content), &manifest.resources);
        tracing::Span::current().record("resources", candidates.len());
        let contents = self.fetch_all(&candidates).await?;

        let mut parts: Vec<ArchivePart> = candidates
            .into_iter()
            .zip(contents)
            .map(|(candidate, content)| {
                let url = match candidate.host_relative {
                    true => candidate.url.strip_prefix(origin.as_str()).unwrap_or(&candidate.url).to_string(),
                    false => candidate.url,
                };
                ArchivePart::resource(url, candidate.mime_type, content)
            })
            .collect();
        parts.push(ArchivePart::document(
            document_url,
            manifest.document.mime_type.as_str(),
            document.content,
        ));

        tracing::info!(parts = parts.len(), "manifest downloaded");
        Ok(parts)
    }

    /// Fetch every candidate with at most `concurrency` in flight, returning
    /// contents in candidate order. The first failure drops everything still
    /// in flight.
    async fn fetch_all(&self, candidates: &[Candidate]) -> Result<Vec<Vec<u8>>> {
        let mut queue = candidates.iter().enumerate();
        let mut processing = FuturesUnordered::new();
        processing.extend(queue.by_ref().take(self.concurrency).map(|(index, c)| self.fetch_one(index, c)));

        let mut contents: Vec<Option<Vec<u8>>> = vec![None; candidates.len()];
        while let Some(result) = processing.next().await {
            let (index, content) = result?;
            contents[index] = Some(content);
            // Pop-n-push, in discovery order.
            if let Some((index, candidate)) = queue.next() {
                processing.push(self.fetch_one(index, candidate));
            }
        }
        Ok(contents.into_iter().flatten().collect())
    }

    async fn fetch_one(&self, index: usize, candidate: &Candidate) -> Result<(usize, Vec<u8>)> {
        let fetched = self
            .fetcher
            .fetch(&candidate.url)
            .await
            .inspect_err(|err| tracing::debug!(url = %candidate.url, error = ?err, "resource fetch failed"))
            .or_raise(|| ErrorKind::Fetch(candidate.url.clone()))?;
        Ok((index, fetched.content))
    }
}
