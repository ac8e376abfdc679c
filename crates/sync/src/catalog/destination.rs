//! Destination album lookup by name.

use crate::api::{DestinationAlbum, DestinationApi};
use crate::error::{SyncError, SyncResult};
use picsync_core::{DestinationItem, HashKind};
use std::sync::Arc;

pub struct DestinationCatalog {
    api: Arc<dyn DestinationApi>,
}

impl DestinationCatalog {
    pub fn new(api: Arc<dyn DestinationApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn DestinationApi> {
        &self.api
    }

    pub fn hash_kind(&self) -> HashKind {
        self.api.hash_kind()
    }

    /// Resolve `name` to exactly one album.
    pub async fn resolve_album(&self, name: &str) -> SyncResult<DestinationAlbum> {
        let mut albums = self.resolve_albums(name, false).await?;
        // resolve_albums guarantees exactly one match here
        albums.pop().ok_or_else(|| SyncError::NotFound {
            kind: "album",
            name: name.to_string(),
        })
    }

    /// Resolve `name` to every album carrying it.
    ///
    /// Zero matches is always an error; more than one is an error unless
    /// `allow_multiple` is set.
    pub async fn resolve_albums(
        &self,
        name: &str,
        allow_multiple: bool,
    ) -> SyncResult<Vec<DestinationAlbum>> {
        let matches: Vec<DestinationAlbum> = self
            .api
            .list_albums()
            .await?
            .into_iter()
            .filter(|album| album.name == name)
            .collect();

        match matches.len() {
            0 => Err(SyncError::NotFound {
                kind: "album",
                name: name.to_string(),
            }),
            1 => Ok(matches),
            count if allow_multiple => {
                tracing::debug!(album = %name, count, "multiple albums share a name");
                Ok(matches)
            }
            count => Err(SyncError::AmbiguousName {
                kind: "album",
                name: name.to_string(),
                count,
            }),
        }
    }

    pub async fn fetch_album_inventory(
        &self,
        album: &DestinationAlbum,
    ) -> SyncResult<Vec<DestinationItem>> {
        let items = self.api.list_album_inventory(album.id).await?;
        tracing::info!(
            album = %album.name,
            album_id = album.id,
            items = items.len(),
            "destination album fetched"
        );
        Ok(items)
    }

    /// Delete every album resolved from `name`. Returns how many were deleted.
    pub async fn delete_albums_by_name(&self, name: &str, allow_multiple: bool) -> SyncResult<usize> {
        let albums = self.resolve_albums(name, allow_multiple).await?;
        for album in &albums {
            self.api.delete_album(album.id).await?;
            tracing::info!(album = %album.name, album_id = album.id, "deleted destination album");
        }
        Ok(albums.len())
    }
}
