//! Download-and-persist cache for web archives.
//!
//! [`ArchiveCache`] sits between callers and the network: it downloads a
//! manifest through a [`ManifestDownloader`](webstash_manifest::ManifestDownloader),
//! encodes the result into a single archive object on a storage backend, and
//! decodes it again on request.
//!
//! # Architecture
//! - Archives are keyed by a caller-supplied identifier and stored at
//!   `archives/{id}.mht`. The storage backend is the only source of truth.
//! - Concurrent downloads of the same identifier are collapsed by the
//!   [`PendingRegistry`]; the losers get [`Download::AlreadyPending`] and can
//!   wait for the winner through [`ArchiveCache::await_until_resolved`].
//! - Archives are written under a temporary key and renamed into place, so a
//!   half-written archive is never visible under its real key.

pub mod error;
mod registry;
mod store;

pub use crate::registry::{PendingGuard, PendingRegistry, WaitPolicy};
pub use crate::store::{ArchiveCache, Download, archive_key};
