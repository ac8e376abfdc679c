//! Nixplay destination adapter.
//!
//! Authenticates with an existing session cookie plus its CSRF token. Photos
//! are uploaded in three steps: a receiver token, an upload slot carrying a
//! signed S3 policy, then a multipart POST of the bytes straight to S3.

use crate::http::{self, check_status, send_empty, send_json, transport};
use anyhow::Context;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use picsync_core::config::NixplayConfig;
use picsync_core::{DestinationId, DestinationItem, Digest, HashKind, WeakHash};
use picsync_sync::{
    ByteStream, DestinationAlbum, DestinationApi, Presentation, SyncError, SyncResult,
    TransferError, UploadRequest,
};
use reqwest::header::{ACCEPT, COOKIE, ORIGIN, REFERER};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const APP_ORIGIN: &str = "https://app.nixplay.com";
const APP_REFERER: &str = "https://app.nixplay.com/";
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Clone)]
pub struct NixplayClient {
    http: reqwest::Client,
    api_base: Url,
    session_cookie: String,
    csrf_token: String,
    page_size: u32,
}

impl NixplayClient {
    pub fn new(config: &NixplayConfig) -> anyhow::Result<Self> {
        let api_base = Url::parse(&config.api_base).context("invalid nixplay.api_base")?;
        if config.page_size == 0 {
            anyhow::bail!("nixplay.page_size must be at least 1");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_base,
            session_cookie: config.session_cookie.clone(),
            csrf_token: config.csrf_token.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> SyncResult<Url> {
        http::join(&self.api_base, path)
    }

    /// Session and CSRF headers for requests to the Nixplay API.
    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(COOKIE, &self.session_cookie)
            .header("X-CSRFToken", &self.csrf_token)
            .header(ORIGIN, APP_ORIGIN)
            .header(REFERER, APP_REFERER)
            .header(ACCEPT, "application/json")
    }

    async fn upload_token(&self, album_id: i64) -> SyncResult<String> {
        let url = self.url("/v3/upload/receivers/")?;
        let response: ReceiverResponse = send_json(self.authed(
            self.http
                .post(url)
                .form(&[("albumId", album_id.to_string()), ("total", "1".to_string())]),
        ))
        .await?;
        Ok(response.token)
    }

    async fn upload_slot(
        &self,
        album_id: i64,
        token: &str,
        filename: &str,
        file_type: &str,
        file_size: u64,
    ) -> SyncResult<UploadSlot> {
        let url = self.url("/v3/photo/upload/")?;
        let response: UploaderResponse = send_json(self.authed(self.http.post(url).form(&[
            ("uploadToken", token.to_string()),
            ("albumId", album_id.to_string()),
            ("fileName", filename.to_string()),
            ("fileType", file_type.to_string()),
            ("fileSize", file_size.to_string()),
        ])))
        .await?;
        Ok(response.data)
    }

    async fn upload_to_s3(
        &self,
        slot: UploadSlot,
        filename: String,
        file_type: String,
        file_size: u64,
        stream: ByteStream,
    ) -> SyncResult<()> {
        let batch_upload_id = if slot.batch_upload_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            slot.batch_upload_id
        };

        let file = Part::stream_with_length(reqwest::Body::wrap_stream(stream), file_size)
            .file_name(filename)
            .mime_str(&file_type)
            .map_err(|e| SyncError::Api(format!("invalid content type {file_type}: {e}")))?;

        let form = Form::new()
            .text("key", slot.key)
            .text("acl", slot.acl)
            .text("content-type", file_type)
            .text("x-amz-meta-batch-upload-id", batch_upload_id)
            .text("success_action_status", "201")
            .text("AWSAccessKeyId", slot.aws_access_key_id)
            .text("Policy", slot.policy)
            .text("Signature", slot.signature)
            .part("file", file);

        // S3 is a different host; the Nixplay session must not leak to it.
        let response = self
            .http
            .post(&slot.s3_upload_url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ORIGIN, APP_ORIGIN)
            .header(REFERER, APP_ORIGIN)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;
        if response.status() != StatusCode::CREATED {
            return Err(TransferError::Status {
                url: slot.s3_upload_url,
                status: response.status().as_u16(),
                body: "expected 201 Created from S3".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AlbumJson {
    id: i64,
    title: String,
    #[serde(default)]
    photo_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PicturesResponse {
    #[serde(default)]
    photos: Vec<PhotoJson>,
}

#[derive(Debug, Deserialize)]
struct PhotoJson {
    id: i64,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    md5: String,
    #[serde(default)]
    url: String,
}

impl TryFrom<PhotoJson> for DestinationItem {
    type Error = SyncError;

    fn try_from(photo: PhotoJson) -> SyncResult<Self> {
        let weak = WeakHash::from_hex(&photo.md5.to_ascii_lowercase()).map_err(|e| {
            SyncError::Api(format!("photo {} has an invalid md5: {e}", photo.id))
        })?;
        Ok(DestinationItem {
            destination_id: DestinationId(photo.id),
            filename: photo.filename,
            digest: Digest::Weak(weak),
            uri: photo.url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReceiverResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UploaderResponse {
    data: UploadSlot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSlot {
    acl: String,
    key: String,
    #[serde(rename = "AWSAccessKeyId")]
    aws_access_key_id: String,
    #[serde(rename = "Policy")]
    policy: String,
    #[serde(rename = "Signature")]
    signature: String,
    #[serde(default)]
    batch_upload_id: String,
    s3_upload_url: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistJson {
    id: i64,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreatePlaylistRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePlaylistResponse {
    playlist_id: i64,
}

#[derive(Debug, Serialize)]
struct PlaylistItems {
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    picture_id: i64,
}

#[async_trait]
impl DestinationApi for NixplayClient {
    fn hash_kind(&self) -> HashKind {
        HashKind::Weak
    }

    async fn list_albums(&self) -> SyncResult<Vec<DestinationAlbum>> {
        let url = self.url("/albums/web/json/")?;
        let albums: Vec<AlbumJson> = send_json(self.authed(self.http.get(url))).await?;
        Ok(albums
            .into_iter()
            .map(|a| DestinationAlbum {
                id: a.id,
                name: a.title,
                item_count: a.photo_count,
            })
            .collect())
    }

    /// Pages until a short page, or until a page repeats only ids already
    /// seen. Photos without a usable md5 are left out of the inventory, so
    /// they are never deleted and never published.
    async fn list_album_inventory(&self, album_id: i64) -> SyncResult<Vec<DestinationItem>> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1u32;
        loop {
            let mut url = self.url(&format!("/album/{album_id}/pictures/json/"))?;
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("limit", &self.page_size.to_string());
            let response: PicturesResponse = send_json(self.authed(self.http.get(url))).await?;

            let count = response.photos.len();
            let mut fresh = 0usize;
            for photo in response.photos {
                if !seen.insert(photo.id) {
                    continue;
                }
                fresh += 1;
                match DestinationItem::try_from(photo) {
                    Ok(item) => items.push(item),
                    Err(e) => tracing::warn!(album_id, error = %e, "skipping photo"),
                }
            }
            if count < self.page_size as usize {
                break;
            }
            if fresh == 0 {
                tracing::warn!(
                    album_id,
                    page,
                    "page repeated earlier photos, stopping pagination"
                );
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn upload(&self, album_id: i64, request: UploadRequest) -> SyncResult<()> {
        let file_type = request
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        // The upload slot needs the size up front.
        let (file_size, stream): (u64, ByteStream) = match request.content_length {
            Some(len) => (len, request.stream),
            None => {
                let mut buf = BytesMut::new();
                let mut stream = request.stream;
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                let bytes = buf.freeze();
                let len = bytes.len() as u64;
                (
                    len,
                    Box::pin(futures::stream::once(async move {
                        Ok::<_, TransferError>(bytes)
                    })),
                )
            }
        };

        let token = self.upload_token(album_id).await?;
        let slot = self
            .upload_slot(album_id, &token, &request.filename, &file_type, file_size)
            .await?;
        self.upload_to_s3(slot, request.filename, file_type, file_size, stream)
            .await
    }

    async fn delete_item(&self, item_id: DestinationId) -> SyncResult<()> {
        let url = self.url(&format!("/picture/{}/delete/json/", item_id.0))?;
        send_empty(self.authed(self.http.post(url))).await
    }

    async fn delete_album(&self, album_id: i64) -> SyncResult<()> {
        let url = self.url(&format!("/album/{album_id}/delete/json/"))?;
        send_empty(self.authed(self.http.post(url))).await
    }

    async fn find_presentation_by_name(&self, name: &str) -> SyncResult<Option<Presentation>> {
        let url = self.url("/v3/playlists")?;
        let playlists: Vec<PlaylistJson> = send_json(self.authed(self.http.get(url))).await?;
        // Names are not unique; the first match wins.
        Ok(playlists
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| Presentation {
                id: p.id,
                name: p.name,
            }))
    }

    async fn create_presentation(&self, name: &str) -> SyncResult<Presentation> {
        let url = self.url("/v3/playlists")?;
        let response: CreatePlaylistResponse = send_json(
            self.authed(self.http.post(url).json(&CreatePlaylistRequest { name })),
        )
        .await?;
        Ok(Presentation {
            id: response.playlist_id,
            name: name.to_string(),
        })
    }

    async fn replace_presentation_membership(
        &self,
        presentation_id: i64,
        items: &[DestinationId],
    ) -> SyncResult<()> {
        let url = self.url(&format!("/v3/playlists/{presentation_id}/items"))?;

        // Posting items appends, so clear the playlist first.
        send_empty(self.authed(self.http.delete(url.clone()))).await?;

        let body = PlaylistItems {
            items: items
                .iter()
                .map(|id| PlaylistItem { picture_id: id.0 })
                .collect(),
        };
        send_empty(self.authed(self.http.post(url).json(&body))).await
    }
}
