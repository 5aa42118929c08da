//! Pending-download registry.
//!
//! Tracks which archive identifiers are currently being downloaded so that a
//! second request for the same identifier is turned away, and so readers can
//! wait for an in-flight download instead of reporting a miss.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How long, and until what signal, to wait for a pending download.
///
/// The default waits forever.
#[derive(Debug, Clone, Default)]
pub struct WaitPolicy {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl WaitPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Set of identifiers with a download in progress.
///
/// Cloning is cheap and every clone shares the same set. All mutation goes
/// through one `watch` channel, which also wakes waiters on every change.
#[derive(Debug, Clone)]
pub struct PendingRegistry {
    pending: Arc<watch::Sender<HashSet<String>>>,
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self {
            pending: Arc::new(watch::Sender::new(HashSet::new())),
        }
    }
}

impl PendingRegistry {
    /// Register `id` as pending.
    ///
    /// Returns `None` if it already is. The returned guard removes `id` again
    /// when dropped, whichever way the download ends.
    pub fn try_begin(&self, id: &str) -> Option<PendingGuard> {
        let inserted = self.pending.send_if_modified(|pending| pending.insert(id.to_string()));
        inserted.then(|| PendingGuard {
            registry: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.borrow().contains(id)
    }

    /// Wait until `id` is no longer pending.
    ///
    /// Returns immediately if nothing is pending for `id`.
    #[instrument(skip(self, policy), fields(timeout = ?policy.timeout))]
    pub async fn await_finish(&self, id: &str, policy: &WaitPolicy) -> Result<()> {
        if !self.is_pending(id) {
            return Ok(());
        }
        tracing::debug!("waiting for pending download");

        let mut receiver = self.pending.subscribe();
        let wait = async {
            let cancelled = async {
                match &policy.cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                released = receiver.wait_for(|pending| !pending.contains(id)) => {
                    released.map(|_| ()).or_raise(|| ErrorKind::Cancelled(id.to_string()))
                },
                () = cancelled => Err(exn::Exn::from(ErrorKind::Cancelled(id.to_string()))),
            }
        };

        match policy.timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .or_raise(|| ErrorKind::Timeout(id.to_string()))?,
            None => wait.await,
        }
    }
}

/// Keeps an identifier registered as pending until dropped.
#[derive(Debug)]
pub struct PendingGuard {
    registry: PendingRegistry,
    id: String,
}

impl PendingGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry.pending.send_modify(|pending| {
            pending.remove(&self.id);
        });
        tracing::trace!(id = %self.id, "pending download released");
    }
}
