//! Network collaborator used by the downloader.

#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpFetcher;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockFetcher;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Body and reported media type of a fetched URL.
///
/// The downloader labels archive parts with the mime type it inferred while
/// discovering the URL, not with `mime_type`, so archives do not depend on
/// what a server happened to report. `mime_type` is kept for callers using a
/// [`Fetcher`] directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
}

impl Fetched {
    pub fn new(content: impl Into<Vec<u8>>, mime_type: Option<&str>) -> Self {
        Self {
            content: content.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }
}

/// Fetches the bytes behind a URL.
///
/// Implementations report any failure (unreachable host, non-success
/// status) as an error; the downloader treats every error as fatal.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched>;
}

pub type FetcherHandle = Arc<dyn Fetcher>;
