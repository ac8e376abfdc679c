//! Capability traits for the remote services a sync talks to.
//!
//! The engine only sees these traits; vendor adapters live in the binary.

use crate::error::{SyncResult, TransferError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use picsync_core::{CachePolicy, DestinationId, DestinationItem, HashKind};
use std::fmt;
use std::pin::Pin;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming transfers.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send>>;

/// An item as listed by a source service, before its bytes are hashed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteItem {
    pub remote_id: String,
    pub filename: String,
    pub download_uri: String,
    pub origin_timestamp: Option<OffsetDateTime>,
}

/// One page of a source album listing.
#[derive(Clone, Debug, Default)]
pub struct SourcePage {
    pub items: Vec<RemoteItem>,
    /// Absent (or empty) on the last page.
    pub next_page_token: Option<String>,
}

/// An open download.
pub struct Download {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Bytes to add to a destination album.
pub struct UploadRequest {
    pub filename: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// An album on the destination service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationAlbum {
    pub id: i64,
    pub name: String,
    pub item_count: Option<u64>,
}

/// A named, ordered grouping of destination items (a playlist).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Presentation {
    pub id: i64,
    pub name: String,
}

/// A service that items are read from.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Cache namespace the service's remote ids live in.
    fn namespace(&self) -> &str;

    /// How long cached hashes for this service may be trusted.
    fn cache_policy(&self) -> CachePolicy;

    /// Fetch one page of an album, starting at `page_token` when given.
    async fn list_album(&self, album_ref: &str, page_token: Option<&str>)
    -> SyncResult<SourcePage>;

    /// Open the bytes behind a listed item's download uri.
    async fn download(&self, uri: &str) -> SyncResult<Download>;
}

/// A service that items are mirrored into.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    /// Digest kind the service reports for its items.
    fn hash_kind(&self) -> HashKind;

    async fn list_albums(&self) -> SyncResult<Vec<DestinationAlbum>>;

    /// Every item in the album, across all pages.
    async fn list_album_inventory(&self, album_id: i64) -> SyncResult<Vec<DestinationItem>>;

    async fn upload(&self, album_id: i64, request: UploadRequest) -> SyncResult<()>;

    async fn delete_item(&self, item_id: DestinationId) -> SyncResult<()>;

    async fn delete_album(&self, album_id: i64) -> SyncResult<()>;

    async fn find_presentation_by_name(&self, name: &str) -> SyncResult<Option<Presentation>>;

    async fn create_presentation(&self, name: &str) -> SyncResult<Presentation>;

    /// Replace the presentation's membership with exactly `items`, in order.
    async fn replace_presentation_membership(
        &self,
        presentation_id: i64,
        items: &[DestinationId],
    ) -> SyncResult<()>;
}
