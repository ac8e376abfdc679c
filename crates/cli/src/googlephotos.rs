//! Google Photos Library API source adapter.

use crate::http::{self, body_stream, check_status, transport};
use anyhow::Context;
use async_trait::async_trait;
use picsync_core::CachePolicy;
use picsync_core::config::{AlbumSources, GooglePhotosConfig};
use picsync_sync::{Download, RemoteItem, SourceApi, SourcePage, SyncResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const NAMESPACE: &str = AlbumSources::GOOGLEPHOTOS;

/// Suffix asking Google Photos for the original bytes of an item.
const DOWNLOAD_SUFFIX: &str = "=d";

#[derive(Clone)]
pub struct GooglePhotosClient {
    http: reqwest::Client,
    api_base: Url,
    access_token: String,
    page_size: u32,
    policy: CachePolicy,
}

impl GooglePhotosClient {
    pub fn new(config: &GooglePhotosConfig) -> anyhow::Result<Self> {
        let api_base = Url::parse(&config.api_base).context("invalid googlephotos.api_base")?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base,
            access_token: config.access_token.clone(),
            page_size: config.page_size,
            policy: config.cache_policy(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    album_id: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItem {
    id: String,
    #[serde(default)]
    filename: String,
    base_url: String,
    #[serde(default)]
    media_metadata: Option<MediaMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    creation_time: Option<String>,
}

impl From<MediaItem> for RemoteItem {
    fn from(item: MediaItem) -> Self {
        let origin_timestamp = item
            .media_metadata
            .and_then(|m| m.creation_time)
            .and_then(|t| OffsetDateTime::parse(&t, &Rfc3339).ok());
        let filename = if item.filename.is_empty() {
            item.id.clone()
        } else {
            item.filename
        };
        RemoteItem {
            download_uri: format!("{}{DOWNLOAD_SUFFIX}", item.base_url),
            remote_id: item.id,
            filename,
            origin_timestamp,
        }
    }
}

#[async_trait]
impl SourceApi for GooglePhotosClient {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn cache_policy(&self) -> CachePolicy {
        self.policy
    }

    async fn list_album(
        &self,
        album_ref: &str,
        page_token: Option<&str>,
    ) -> SyncResult<SourcePage> {
        let url = http::join(&self.api_base, "/v1/mediaItems:search")?;
        let body = SearchRequest {
            album_id: album_ref,
            page_size: self.page_size,
            page_token,
        };
        let response: SearchResponse = http::send_json(
            self.http
                .post(url)
                .bearer_auth(&self.access_token)
                .json(&body),
        )
        .await?;

        Ok(SourcePage {
            items: response.media_items.into_iter().map(Into::into).collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn download(&self, uri: &str) -> SyncResult<Download> {
        let response = self.http.get(uri).send().await.map_err(transport)?;
        let response = check_status(response).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Download {
            content_type,
            content_length: response.content_length(),
            stream: body_stream(response),
        })
    }
}
