//! Persistent stores for encoded archives.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

/// Shared handle to a store, as held by the cache.
pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
