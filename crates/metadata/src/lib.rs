//! Persistent content-hash cache for picsync.
//!
//! Maps `(namespace, remote_id)` to the SHA-256 and MD5 of the item's bytes
//! so unchanged source items are never downloaded twice. Backed by a single
//! SQLite file with a versioned schema.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{CacheEntryRow, CacheStatus, NewCacheEntry};
pub use repos::EntryRepo;
pub use store::{ContentCache, SCHEMA_VERSION, SqliteStore};

use picsync_core::config::CacheConfig;
use std::sync::Arc;

/// Open the cache described by configuration.
pub async fn from_config(config: &CacheConfig) -> MetadataResult<Arc<dyn ContentCache>> {
    let store = SqliteStore::new(&config.path, Some(config.busy_timeout_secs)).await?;
    tracing::info!(path = %config.path.display(), "metadata cache ready");
    Ok(Arc::new(store) as Arc<dyn ContentCache>)
}
