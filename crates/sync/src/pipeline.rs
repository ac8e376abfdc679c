//! One album pair: list sources, diff against the destination, apply.

use crate::api::{DestinationApi, SourceApi};
use crate::catalog::{DestinationCatalog, SourceCatalog};
use crate::error::{SyncError, SyncResult};
use crate::publish::{PublishOptions, PublishReport, Publisher};
use picsync_core::config::AlbumConfig;
use picsync_core::diff;
use picsync_metadata::ContentCache;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A source album, qualified by the service that hosts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    /// Namespace of the source service, as reported by [`SourceApi::namespace`].
    pub namespace: String,
    pub album_ref: String,
}

impl SourceRef {
    pub fn new(namespace: impl Into<String>, album_ref: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            album_ref: album_ref.into(),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.album_ref)
    }
}

/// Source albums feeding one destination album.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlbumPair {
    /// Destination album name.
    pub name: String,
    pub source_refs: Vec<SourceRef>,
    pub dry_run: bool,
    pub force_publish: bool,
    pub strict_empty_source: bool,
}

impl AlbumPair {
    pub fn new(name: impl Into<String>, source_refs: Vec<SourceRef>) -> Self {
        Self {
            name: name.into(),
            source_refs,
            dry_run: false,
            force_publish: false,
            strict_empty_source: false,
        }
    }
}

impl From<&AlbumConfig> for AlbumPair {
    fn from(config: &AlbumConfig) -> Self {
        Self {
            name: config.name.clone(),
            source_refs: config
                .sources
                .refs()
                .map(|(namespace, album_ref)| SourceRef::new(namespace, album_ref))
                .collect(),
            dry_run: config.dry_run,
            force_publish: config.force_publish,
            strict_empty_source: config.strict_empty_source,
        }
    }
}

/// What happened to one pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairOutcome {
    pub album: String,
    pub source_items: usize,
    pub destination_items: usize,
    pub planned_uploads: usize,
    pub planned_deletes: usize,
    pub duplicates: usize,
    pub guard_tripped: bool,
    /// Absent for dry runs and when the guard tripped.
    pub report: Option<PublishReport>,
}

/// Runs album pairs against one destination service and any number of
/// source services, one per namespace.
pub struct Pipeline {
    sources: BTreeMap<String, SourceCatalog>,
    cache: Arc<dyn ContentCache>,
    destination: DestinationCatalog,
    publisher: Publisher,
    ingest_delay: Duration,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourceApi>,
        destination: Arc<dyn DestinationApi>,
        cache: Arc<dyn ContentCache>,
    ) -> Self {
        Self {
            sources: BTreeMap::new(),
            cache,
            destination: DestinationCatalog::new(destination.clone()),
            publisher: Publisher::new(destination),
            ingest_delay: PublishOptions::default().ingest_delay,
        }
        .with_source(source)
    }

    /// Register another source service. A source with the same namespace
    /// is replaced.
    pub fn with_source(mut self, source: Arc<dyn SourceApi>) -> Self {
        let namespace = source.namespace().to_string();
        tracing::debug!(%namespace, "registered source service");
        self.sources.insert(
            namespace,
            SourceCatalog::new(source.clone(), self.cache.clone()),
        );
        self.publisher = self.publisher.with_source(source);
        self
    }

    pub fn with_ingest_delay(mut self, delay: Duration) -> Self {
        self.ingest_delay = delay;
        self
    }

    fn catalog(&self, source_ref: &SourceRef) -> SyncResult<&SourceCatalog> {
        self.sources
            .get(&source_ref.namespace)
            .ok_or_else(|| SyncError::NotFound {
                kind: "source service",
                name: source_ref.namespace.clone(),
            })
    }

    pub async fn sync_pair(&self, pair: &AlbumPair) -> SyncResult<PairOutcome> {
        let mut source_items = Vec::new();
        for source_ref in &pair.source_refs {
            let catalog = self.catalog(source_ref)?;
            source_items.extend(catalog.collect_album(&source_ref.album_ref).await?);
        }

        let album = self.destination.resolve_album(&pair.name).await?;
        let dest_items = self.destination.fetch_album_inventory(&album).await?;

        let reconciliation = diff(&source_items, &dest_items, self.destination.hash_kind());
        let mut outcome = PairOutcome {
            album: pair.name.clone(),
            source_items: source_items.len(),
            destination_items: dest_items.len(),
            planned_uploads: reconciliation.work.to_upload.len(),
            planned_deletes: reconciliation.work.to_delete.len(),
            duplicates: reconciliation.duplicate_count(),
            guard_tripped: reconciliation.guard_tripped(),
            report: None,
        };

        if outcome.guard_tripped {
            if pair.strict_empty_source {
                return Err(SyncError::ReconciliationGuard(format!(
                    "sources for album '{}' are empty but the album holds {} items",
                    pair.name, outcome.destination_items
                )));
            }
            tracing::warn!(
                album = %pair.name,
                "sources are empty, skipping album to avoid wiping it"
            );
            return Ok(outcome);
        }

        if pair.dry_run {
            for item in &reconciliation.work.to_upload {
                tracing::info!(album = %pair.name, filename = %item.filename, "dry run: would upload");
            }
            for item in &reconciliation.work.to_delete {
                tracing::info!(
                    album = %pair.name,
                    filename = %item.filename,
                    destination_id = %item.destination_id,
                    "dry run: would delete"
                );
            }
            tracing::info!(
                album = %pair.name,
                to_upload = outcome.planned_uploads,
                to_delete = outcome.planned_deletes,
                "dry run, not applying changes"
            );
            return Ok(outcome);
        }

        let options = PublishOptions {
            force_publish: pair.force_publish,
            ingest_delay: self.ingest_delay,
        };
        let report = self
            .publisher
            .apply(&reconciliation.work, &album, &options)
            .await?;
        tracing::info!(
            album = %pair.name,
            uploaded = report.uploaded,
            deleted = report.deleted,
            failed = report.failed_items(),
            "album synced"
        );
        outcome.report = Some(report);
        Ok(outcome)
    }
}
