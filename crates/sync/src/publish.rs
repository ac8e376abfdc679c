//! Applies a work list to a destination album and republishes its presentation.

use crate::api::{DestinationAlbum, DestinationApi, SourceApi, UploadRequest};
use crate::error::{SyncError, SyncResult};
use picsync_core::{DestinationItem, SourceItem, WorkList, presentation_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Knobs for one [`Publisher::apply`] call.
#[derive(Clone, Debug)]
pub struct PublishOptions {
    /// Republish the presentation even when nothing changed.
    pub force_publish: bool,
    /// Pause after successful uploads before re-reading the destination.
    pub ingest_delay: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            force_publish: false,
            ingest_delay: Duration::from_secs(5),
        }
    }
}

/// A single upload or delete that failed and was skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    /// Filename for uploads, destination id for deletes.
    pub item: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresentationOutcome {
    /// Nothing changed and the presentation already existed.
    Unchanged,
    /// Membership was replaced with this many items.
    Published { items: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishReport {
    pub uploaded: usize,
    pub upload_failures: Vec<ItemFailure>,
    pub deleted: usize,
    pub delete_failures: Vec<ItemFailure>,
    pub presentation_created: bool,
    pub presentation: PresentationOutcome,
}

impl PublishReport {
    pub fn failed_items(&self) -> usize {
        self.upload_failures.len() + self.delete_failures.len()
    }
}

/// Moves bytes from the sources to the destination.
///
/// Each upload is downloaded from the source registered under the item's
/// namespace.
pub struct Publisher {
    sources: HashMap<String, Arc<dyn SourceApi>>,
    destination: Arc<dyn DestinationApi>,
}

impl Publisher {
    pub fn new(destination: Arc<dyn DestinationApi>) -> Self {
        Self {
            sources: HashMap::new(),
            destination,
        }
    }

    /// Register a source, replacing any other source with the same namespace.
    pub fn with_source(mut self, source: Arc<dyn SourceApi>) -> Self {
        self.sources.insert(source.namespace().to_string(), source);
        self
    }

    /// Upload, then delete, then publish. Failed uploads and deletes are
    /// recorded in the report and skipped; anything else aborts.
    pub async fn apply(
        &self,
        work: &WorkList,
        album: &DestinationAlbum,
        options: &PublishOptions,
    ) -> SyncResult<PublishReport> {
        let mut uploaded = 0;
        let mut upload_failures = Vec::new();
        for item in &work.to_upload {
            match self.upload_one(album, item).await {
                Ok(()) => {
                    uploaded += 1;
                    tracing::info!(
                        album = %album.name,
                        filename = %item.filename,
                        progress = %format!("{}/{}", uploaded + upload_failures.len(), work.to_upload.len()),
                        "uploaded item"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        album = %album.name,
                        filename = %item.filename,
                        error = %e,
                        "upload failed, skipping item"
                    );
                    upload_failures.push(ItemFailure {
                        item: item.filename.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if uploaded > 0 && !options.ingest_delay.is_zero() {
            tracing::debug!(
                delay_ms = options.ingest_delay.as_millis() as u64,
                "waiting for destination to ingest uploads"
            );
            tokio::time::sleep(options.ingest_delay).await;
        }

        let mut deleted = 0;
        let mut delete_failures = Vec::new();
        for item in &work.to_delete {
            match self.delete_one(item).await {
                Ok(()) => {
                    deleted += 1;
                    tracing::info!(
                        album = %album.name,
                        filename = %item.filename,
                        destination_id = %item.destination_id,
                        "deleted item"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        album = %album.name,
                        destination_id = %item.destination_id,
                        error = %e,
                        "delete failed, skipping item"
                    );
                    delete_failures.push(ItemFailure {
                        item: item.destination_id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let name = presentation_name(&album.name);
        let (presentation, presentation_created) =
            match self.destination.find_presentation_by_name(&name).await? {
                Some(existing) => (existing, false),
                None => {
                    let created = self.destination.create_presentation(&name).await?;
                    tracing::info!(presentation = %name, id = created.id, "created presentation");
                    (created, true)
                }
            };

        let presentation_outcome =
            if work.is_empty() && !presentation_created && !options.force_publish {
                tracing::info!(presentation = %name, "no changes, leaving presentation as is");
                PresentationOutcome::Unchanged
            } else {
                let inventory = self.destination.list_album_inventory(album.id).await?;
                let ids: Vec<_> = inventory.iter().map(|i| i.destination_id).collect();
                self.destination
                    .replace_presentation_membership(presentation.id, &ids)
                    .await?;
                tracing::info!(presentation = %name, items = ids.len(), "published presentation");
                PresentationOutcome::Published { items: ids.len() }
            };

        Ok(PublishReport {
            uploaded,
            upload_failures,
            deleted,
            delete_failures,
            presentation_created,
            presentation: presentation_outcome,
        })
    }

    async fn upload_one(&self, album: &DestinationAlbum, item: &SourceItem) -> SyncResult<()> {
        let source = self
            .sources
            .get(&item.namespace)
            .ok_or_else(|| SyncError::NotFound {
                kind: "source service",
                name: item.namespace.clone(),
            })?;
        let download = source.download(&item.download_uri).await?;
        let request = UploadRequest {
            filename: item.filename.clone(),
            content_type: download.content_type,
            content_length: download.content_length,
            stream: download.stream,
        };
        self.destination.upload(album.id, request).await
    }

    async fn delete_one(&self, item: &DestinationItem) -> SyncResult<()> {
        self.destination.delete_item(item.destination_id).await
    }
}
