//! Source album listing backed by the content cache.

use crate::api::{RemoteItem, SourceApi};
use crate::error::{SyncError, SyncResult};
use futures::{Stream, StreamExt};
use picsync_core::{CachePolicy, DualHasher, SourceItem};
use picsync_metadata::{CacheEntryRow, ContentCache, EntryRepo, NewCacheEntry};
use std::pin::Pin;
use std::sync::Arc;
use time::OffsetDateTime;

/// How an item's hashes were obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the cache without downloading.
    Hit,
    /// Not cached; downloaded and hashed.
    Downloaded,
    /// Cached but stale under the cache policy; downloaded again.
    Revalidated,
}

/// Progress emitted while walking a source album.
#[derive(Clone, Debug)]
pub enum CatalogEvent {
    Item {
        item: SourceItem,
        outcome: CacheOutcome,
    },
    /// A page has been fully processed. Passing `next_page_token` to
    /// [`SourceCatalog::fetch_album_from`] resumes after it.
    PageDone {
        items: usize,
        next_page_token: Option<String>,
    },
}

pub type CatalogStream<'a> = Pin<Box<dyn Stream<Item = SyncResult<CatalogEvent>> + Send + 'a>>;

/// Lists source albums, hashing each item's bytes at most once.
pub struct SourceCatalog {
    api: Arc<dyn SourceApi>,
    cache: Arc<dyn ContentCache>,
    policy: CachePolicy,
}

impl SourceCatalog {
    pub fn new(api: Arc<dyn SourceApi>, cache: Arc<dyn ContentCache>) -> Self {
        let policy = api.cache_policy();
        Self { api, cache, policy }
    }

    /// Override the adapter's default cache policy.
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Walk an album from its first page.
    pub fn fetch_album<'a>(&'a self, album_ref: &'a str) -> CatalogStream<'a> {
        self.fetch_album_from(album_ref, None)
    }

    /// Walk an album starting at `page_token`.
    ///
    /// Pages are fetched lazily, one per poll that runs out of buffered items.
    /// Any listing, download or cache failure ends the stream with that error.
    pub fn fetch_album_from<'a>(
        &'a self,
        album_ref: &'a str,
        page_token: Option<String>,
    ) -> CatalogStream<'a> {
        Box::pin(async_stream::try_stream! {
            let mut token = page_token;
            loop {
                let page = self.api.list_album(album_ref, token.as_deref()).await?;
                let items = page.items.len();
                tracing::debug!(album = %album_ref, items, "source page listed");

                for remote in page.items {
                    let (item, outcome) = self.resolve(remote).await?;
                    yield CatalogEvent::Item { item, outcome };
                }

                let next = page.next_page_token.filter(|t| !t.is_empty());
                yield CatalogEvent::PageDone {
                    items,
                    next_page_token: next.clone(),
                };

                match next {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
        })
    }

    /// Drain [`fetch_album`](Self::fetch_album) into a list, logging progress.
    pub async fn collect_album(&self, album_ref: &str) -> SyncResult<Vec<SourceItem>> {
        let mut stream = self.fetch_album(album_ref);
        let mut items = Vec::new();
        let mut hits = 0usize;
        let mut downloads = 0usize;

        while let Some(event) = stream.next().await {
            match event? {
                CatalogEvent::Item { item, outcome } => {
                    match outcome {
                        CacheOutcome::Hit => hits += 1,
                        CacheOutcome::Downloaded | CacheOutcome::Revalidated => downloads += 1,
                    }
                    items.push(item);
                }
                CatalogEvent::PageDone { .. } => {
                    tracing::info!(
                        album = %album_ref,
                        items = items.len(),
                        "fetching source album"
                    );
                }
            }
        }

        tracing::info!(
            album = %album_ref,
            items = items.len(),
            cache_hits = hits,
            downloaded = downloads,
            "source album fetched"
        );
        Ok(items)
    }

    async fn resolve(&self, remote: RemoteItem) -> SyncResult<(SourceItem, CacheOutcome)> {
        let namespace = self.api.namespace();
        let cached = self.cache.lookup(namespace, &remote.remote_id).await?;

        let (row, outcome) = match cached {
            Some(row) if !self.is_stale(&row) => {
                let row = self.cache.upsert(&NewCacheEntry::refresh(&row)).await?;
                (row, CacheOutcome::Hit)
            }
            Some(_) => (self.download_and_hash(&remote).await?, CacheOutcome::Revalidated),
            None => (self.download_and_hash(&remote).await?, CacheOutcome::Downloaded),
        };

        let (content_hash, weak_hash) = row.hashes().map_err(|e| {
            SyncError::Api(format!(
                "cache entry for {} holds an invalid digest: {e}",
                remote.remote_id
            ))
        })?;

        let item = SourceItem {
            namespace: namespace.to_string(),
            remote_id: remote.remote_id,
            filename: remote.filename,
            content_hash,
            weak_hash,
            download_uri: remote.download_uri,
            origin_timestamp: remote.origin_timestamp,
            cache_id: row.cache_id,
        };
        Ok((item, outcome))
    }

    async fn download_and_hash(&self, remote: &RemoteItem) -> SyncResult<CacheEntryRow> {
        let download = self.api.download(&remote.download_uri).await?;
        let mut stream = download.stream;
        let mut hasher = DualHasher::new();
        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }

        let bytes = hasher.bytes_hashed();
        let (content_hash, weak_hash) = hasher.finalize();
        tracing::debug!(
            remote_id = %remote.remote_id,
            filename = %remote.filename,
            bytes,
            content_hash = %content_hash,
            "hashed source item"
        );

        let entry = NewCacheEntry::from_hashes(
            self.api.namespace(),
            &remote.remote_id,
            &content_hash,
            &weak_hash,
        );
        Ok(self.cache.upsert(&entry).await?)
    }

    fn is_stale(&self, row: &CacheEntryRow) -> bool {
        // Entries stamped in the future count as fresh.
        let age = std::time::Duration::try_from(OffsetDateTime::now_utc() - row.last_updated)
            .unwrap_or_default();
        self.policy.is_stale(age)
    }
}
