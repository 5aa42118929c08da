//! Turn a manifest into a complete, fetched set of archive parts.
//!
//! The main document is fetched first and scanned for the resources it
//! references ([`resolve`]). Those, the resources the manifest declares and
//! the site favicon are then fetched concurrently through a [`Fetcher`]
//! ([`ManifestDownloader`]). A single failed fetch fails the whole download.

mod consts;
mod download;
pub mod error;
pub mod fetch;
mod model;
pub mod resolve;

pub use crate::download::{DEFAULT_CONCURRENCY, ManifestDownloader};
pub use crate::fetch::{Fetched, Fetcher, FetcherHandle};
pub use crate::model::{DocumentSpec, ResourceSpec, Usage, WebArchiveManifest};
