//! In-memory fetcher for testing.

use super::{Fetched, Fetcher};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Fetcher answering from canned responses.
///
/// Unknown URLs answer with a 404 status error. Every call is counted per
/// URL, and the highest number of simultaneous fetches is recorded so tests
/// can check concurrency limits.
///
/// # Examples
///
/// ```ignore
/// use webstash_manifest::fetch::{Fetcher, MockFetcher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = MockFetcher::default()
///     .with_response("https://example.com/", "text/html", "<html></html>")
///     .with_failure("https://example.com/broken.js");
/// assert!(fetcher.fetch("https://example.com/").await.is_ok());
/// assert!(fetcher.fetch("https://example.com/broken.js").await.is_err());
/// assert_eq!(fetcher.calls("https://example.com/").await, 1);
/// # }
/// ```
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Fetched>,
    failures: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockFetcher {
    pub fn with_response(mut self, url: impl Into<String>, mime_type: &str, content: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.into(), Fetched::new(content, Some(mime_type)));
        self
    }

    /// Make `url` fail with a network-style error.
    pub fn with_failure(mut self, url: impl Into<String>) -> Self {
        self.failures.insert(url.into());
        self
    }

    /// Delay every response, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self, url: &str) -> usize {
        self.calls.lock().await.get(url).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }

    /// Highest number of fetches that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        *self.calls.lock().await.entry(url.to_string()).or_default() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.failures.contains(url) {
            Err(ErrorKind::Fetch(url.to_string()).into())
        } else {
            self.responses.get(url).cloned().ok_or_else(|| {
                exn::Exn::from(ErrorKind::Status {
                    url: url.to_string(),
                    status: 404,
                })
            })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
