//! In-memory source and destination services with call counters.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use picsync_core::{CachePolicy, DestinationId, DestinationItem, Digest, HashKind, WeakHash};
use picsync_metadata::{ContentCache, SqliteStore};
use picsync_sync::{
    DestinationAlbum, DestinationApi, Download, Presentation, RemoteItem, SourceApi, SourcePage,
    SourceRef, SyncError, SyncResult, TransferError, UploadRequest,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Bytes behind a seed on both fake services.
pub fn content(seed: &str) -> Vec<u8> {
    format!("pixels of {seed}").into_bytes()
}

pub fn weak_digest(seed: &str) -> Digest {
    Digest::Weak(WeakHash::compute(&content(seed)))
}

pub fn filename(seed: &str) -> String {
    format!("{seed}.jpg")
}

/// Refs to albums of the default `fake` source.
pub fn fake_refs(album_refs: &[&str]) -> Vec<SourceRef> {
    album_refs
        .iter()
        .map(|album_ref| SourceRef::new("fake", *album_ref))
        .collect()
}

pub async fn memory_cache() -> Arc<dyn ContentCache> {
    Arc::new(
        SqliteStore::new(":memory:", None)
            .await
            .expect("Failed to open in-memory cache"),
    )
}

pub struct FakeSource {
    namespace: String,
    albums: Mutex<HashMap<String, Vec<String>>>,
    failing_downloads: Mutex<HashSet<String>>,
    page_size: usize,
    policy: CachePolicy,
    pub downloads: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Self::with_options(2, CachePolicy::Immutable)
    }

    /// A source listing under `namespace`. Its download URIs carry the
    /// namespace, and it refuses URIs issued by any other source.
    pub fn with_namespace(namespace: &str) -> Arc<Self> {
        Self::build(namespace, 2, CachePolicy::Immutable)
    }

    pub fn with_options(page_size: usize, policy: CachePolicy) -> Arc<Self> {
        Self::build("fake", page_size, policy)
    }

    fn build(namespace: &str, page_size: usize, policy: CachePolicy) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            albums: Mutex::new(HashMap::new()),
            failing_downloads: Mutex::new(HashSet::new()),
            page_size,
            policy,
            downloads: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_album(&self, album_ref: &str, seeds: &[&str]) {
        self.albums.lock().unwrap().insert(
            album_ref.to_string(),
            seeds.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn fail_download(&self, seed: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(seed.to_string());
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn cache_policy(&self) -> CachePolicy {
        self.policy
    }

    async fn list_album(
        &self,
        album_ref: &str,
        page_token: Option<&str>,
    ) -> SyncResult<SourcePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let seeds = self
            .albums
            .lock()
            .unwrap()
            .get(album_ref)
            .cloned()
            .ok_or_else(|| SyncError::NotFound {
                kind: "source album",
                name: album_ref.to_string(),
            })?;

        let start: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| SyncError::Api(format!("bad page token {token}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(seeds.len());
        let items = seeds[start.min(end)..end]
            .iter()
            .map(|seed| RemoteItem {
                remote_id: format!("remote-{seed}"),
                filename: filename(seed),
                download_uri: format!("{}://{seed}", self.namespace),
                origin_timestamp: None,
            })
            .collect();
        let next_page_token = (end < seeds.len()).then(|| end.to_string());
        Ok(SourcePage {
            items,
            next_page_token,
        })
    }

    async fn download(&self, uri: &str) -> SyncResult<Download> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("{}://", self.namespace);
        let Some(seed) = uri.strip_prefix(&prefix) else {
            return Err(SyncError::Api(format!(
                "{} cannot download {uri}",
                self.namespace
            )));
        };
        if self.failing_downloads.lock().unwrap().contains(seed) {
            return Err(TransferError::Status {
                url: uri.to_string(),
                status: 500,
                body: "boom".to_string(),
            }
            .into());
        }

        let bytes = content(seed);
        let len = bytes.len() as u64;
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let chunks = vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ];
        Ok(Download {
            content_type: Some("image/jpeg".to_string()),
            content_length: Some(len),
            stream: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

#[derive(Default)]
struct DestState {
    albums: Vec<FakeAlbum>,
    presentations: Vec<FakePresentation>,
}

struct FakeAlbum {
    id: i64,
    name: String,
    items: Vec<DestinationItem>,
}

struct FakePresentation {
    id: i64,
    name: String,
    members: Vec<DestinationId>,
}

pub struct FakeDestination {
    state: Mutex<DestState>,
    next_id: AtomicI64,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<DestinationId>>,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub creates: AtomicUsize,
    pub publishes: AtomicUsize,
}

impl FakeDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DestState::default()),
            next_id: AtomicI64::new(1),
            failing_uploads: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            publishes: AtomicUsize::new(0),
        })
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn add_album(&self, name: &str) -> i64 {
        let id = self.next_id();
        self.state.lock().unwrap().albums.push(FakeAlbum {
            id,
            name: name.to_string(),
            items: Vec::new(),
        });
        id
    }

    pub fn add_item(&self, album_id: i64, seed: &str) -> DestinationId {
        let id = DestinationId(self.next_id());
        let mut state = self.state.lock().unwrap();
        let album = state
            .albums
            .iter_mut()
            .find(|a| a.id == album_id)
            .expect("unknown album");
        album.items.push(DestinationItem {
            destination_id: id,
            filename: filename(seed),
            digest: weak_digest(seed),
            uri: format!("https://frame.test/{}", id.0),
        });
        id
    }

    pub fn fail_upload(&self, seed: &str) {
        self.failing_uploads.lock().unwrap().insert(filename(seed));
    }

    pub fn fail_delete(&self, id: DestinationId) {
        self.failing_deletes.lock().unwrap().insert(id);
    }

    pub fn album_ids(&self) -> Vec<i64> {
        self.state.lock().unwrap().albums.iter().map(|a| a.id).collect()
    }

    pub fn album_digests(&self, album_id: i64) -> HashSet<Digest> {
        self.album_items(album_id).iter().map(|i| i.digest).collect()
    }

    pub fn album_items(&self, album_id: i64) -> Vec<DestinationItem> {
        self.state
            .lock()
            .unwrap()
            .albums
            .iter()
            .find(|a| a.id == album_id)
            .map(|a| a.items.clone())
            .unwrap_or_default()
    }

    pub fn presentation_members(&self, name: &str) -> Option<Vec<DestinationId>> {
        self.state
            .lock()
            .unwrap()
            .presentations
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.members.clone())
    }

    /// Calls that change destination state.
    pub fn mutation_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
            + self.creates.load(Ordering::SeqCst)
            + self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationApi for FakeDestination {
    fn hash_kind(&self) -> HashKind {
        HashKind::Weak
    }

    async fn list_albums(&self) -> SyncResult<Vec<DestinationAlbum>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .albums
            .iter()
            .map(|a| DestinationAlbum {
                id: a.id,
                name: a.name.clone(),
                item_count: Some(a.items.len() as u64),
            })
            .collect())
    }

    async fn list_album_inventory(&self, album_id: i64) -> SyncResult<Vec<DestinationItem>> {
        let state = self.state.lock().unwrap();
        let album = state
            .albums
            .iter()
            .find(|a| a.id == album_id)
            .ok_or_else(|| SyncError::NotFound {
                kind: "album",
                name: album_id.to_string(),
            })?;
        Ok(album.items.clone())
    }

    async fn upload(&self, album_id: i64, request: UploadRequest) -> SyncResult<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_uploads
            .lock()
            .unwrap()
            .contains(&request.filename)
        {
            return Err(TransferError::Status {
                url: "https://frame.test/upload".to_string(),
                status: 503,
                body: "try later".to_string(),
            }
            .into());
        }

        let mut stream = request.stream;
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }

        let id = DestinationId(self.next_id());
        let mut state = self.state.lock().unwrap();
        let album = state
            .albums
            .iter_mut()
            .find(|a| a.id == album_id)
            .ok_or_else(|| SyncError::NotFound {
                kind: "album",
                name: album_id.to_string(),
            })?;
        album.items.push(DestinationItem {
            destination_id: id,
            filename: request.filename,
            digest: Digest::Weak(WeakHash::compute(&data)),
            uri: format!("https://frame.test/{}", id.0),
        });
        Ok(())
    }

    async fn delete_item(&self, item_id: DestinationId) -> SyncResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().unwrap().contains(&item_id) {
            return Err(TransferError::Status {
                url: format!("https://frame.test/{}", item_id.0),
                status: 500,
                body: "delete failed".to_string(),
            }
            .into());
        }
        let mut state = self.state.lock().unwrap();
        for album in &mut state.albums {
            if let Some(pos) = album.items.iter().position(|i| i.destination_id == item_id) {
                album.items.remove(pos);
                return Ok(());
            }
        }
        Err(TransferError::Status {
            url: format!("https://frame.test/{}", item_id.0),
            status: 404,
            body: "no such item".to_string(),
        }
        .into())
    }

    async fn delete_album(&self, album_id: i64) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.albums.retain(|a| a.id != album_id);
        Ok(())
    }

    async fn find_presentation_by_name(&self, name: &str) -> SyncResult<Option<Presentation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .presentations
            .iter()
            .find(|p| p.name == name)
            .map(|p| Presentation {
                id: p.id,
                name: p.name.clone(),
            }))
    }

    async fn create_presentation(&self, name: &str) -> SyncResult<Presentation> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id();
        self.state
            .lock()
            .unwrap()
            .presentations
            .push(FakePresentation {
                id,
                name: name.to_string(),
                members: Vec::new(),
            });
        Ok(Presentation {
            id,
            name: name.to_string(),
        })
    }

    async fn replace_presentation_membership(
        &self,
        presentation_id: i64,
        items: &[DestinationId],
    ) -> SyncResult<()> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let presentation = state
            .presentations
            .iter_mut()
            .find(|p| p.id == presentation_id)
            .ok_or_else(|| SyncError::NotFound {
                kind: "presentation",
                name: presentation_id.to_string(),
            })?;
        presentation.members = items.to_vec();
        Ok(())
    }
}
