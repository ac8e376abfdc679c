//! Database models mapping to the cache schema.

use picsync_core::{ContentHash, WeakHash};
use sqlx::FromRow;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// One cached remote item: identity plus the hashes of its bytes.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRow {
    /// Surrogate key, assigned on first insert and never changed.
    pub cache_id: i64,
    /// Source service the remote id belongs to (e.g. "googlephotos").
    pub namespace: String,
    pub remote_id: String,
    /// SHA-256, lowercase hex.
    pub content_hash: String,
    /// MD5, lowercase hex.
    pub weak_hash: String,
    pub last_updated: OffsetDateTime,
    pub last_used: OffsetDateTime,
}

impl CacheEntryRow {
    /// Decode the stored hex digests.
    pub fn hashes(&self) -> picsync_core::Result<(ContentHash, WeakHash)> {
        Ok((
            ContentHash::from_hex(&self.content_hash)?,
            WeakHash::from_hex(&self.weak_hash)?,
        ))
    }
}

/// Input to an upsert.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub namespace: String,
    pub remote_id: String,
    pub content_hash: String,
    pub weak_hash: String,
    /// Defaults to now when unset.
    pub last_updated: Option<OffsetDateTime>,
}

impl NewCacheEntry {
    /// Build an entry from freshly computed digests.
    pub fn from_hashes(
        namespace: impl Into<String>,
        remote_id: impl Into<String>,
        content_hash: &ContentHash,
        weak_hash: &WeakHash,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            remote_id: remote_id.into(),
            content_hash: content_hash.to_hex(),
            weak_hash: weak_hash.to_hex(),
            last_updated: None,
        }
    }

    /// Re-stamp an existing row: same hashes and `last_updated`.
    pub fn refresh(row: &CacheEntryRow) -> Self {
        Self {
            namespace: row.namespace.clone(),
            remote_id: row.remote_id.clone(),
            content_hash: row.content_hash.clone(),
            weak_hash: row.weak_hash.clone(),
            last_updated: Some(row.last_updated),
        }
    }
}

/// Entry counts reported by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatus {
    /// Valid entries per namespace.
    pub entries: BTreeMap<String, i64>,
}

impl CacheStatus {
    pub fn total(&self) -> i64 {
        self.entries.values().sum()
    }
}
