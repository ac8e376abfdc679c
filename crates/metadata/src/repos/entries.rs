//! Cache entry repository trait.

use crate::error::MetadataResult;
use crate::models::{CacheEntryRow, CacheStatus, NewCacheEntry};
use async_trait::async_trait;

/// Repository for remote-id to content-hash entries.
#[async_trait]
pub trait EntryRepo: Send + Sync {
    /// Look up the entry for a remote id. Absence is not an error.
    async fn lookup(&self, namespace: &str, remote_id: &str)
    -> MetadataResult<Option<CacheEntryRow>>;

    /// Insert or update the entry for `entry.remote_id`.
    ///
    /// An existing row keeps its `cache_id` and gets the new hashes and
    /// timestamps. `last_used` is always set to now.
    async fn upsert(&self, entry: &NewCacheEntry) -> MetadataResult<CacheEntryRow>;

    /// Count valid entries per namespace.
    async fn status(&self) -> MetadataResult<CacheStatus>;
}
