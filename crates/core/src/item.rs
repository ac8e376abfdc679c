//! Content-addressed items on both sides of a sync, and the work list.

use crate::hash::{ContentHash, Digest, HashKind, WeakHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Handle assigned by the destination service to one of its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An item listed from a source album, backed by a cache entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceItem {
    /// Source service the item was listed from.
    pub namespace: String,
    /// Identifier issued by the source service.
    pub remote_id: String,
    pub filename: String,
    pub content_hash: ContentHash,
    pub weak_hash: WeakHash,
    /// Where the bytes can be fetched from.
    pub download_uri: String,
    /// Capture/creation time reported by the source, if any.
    pub origin_timestamp: Option<OffsetDateTime>,
    /// Surrogate key of the backing cache entry.
    pub cache_id: i64,
}

impl SourceItem {
    /// Project this item onto the digest kind a destination exposes.
    pub fn digest(&self, kind: HashKind) -> Digest {
        match kind {
            HashKind::Strong => Digest::Strong(self.content_hash),
            HashKind::Weak => Digest::Weak(self.weak_hash),
        }
    }
}

/// An item currently present in a destination album.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationItem {
    pub destination_id: DestinationId,
    pub filename: String,
    pub digest: Digest,
    pub uri: String,
}

/// Upload/delete plan produced by one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkList {
    pub to_upload: Vec<SourceItem>,
    pub to_delete: Vec<DestinationItem>,
}

impl WorkList {
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty()
    }
}
