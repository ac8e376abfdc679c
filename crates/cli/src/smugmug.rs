//! SmugMug API v2 source adapter.
//!
//! Every request, archive downloads included, carries an OAuth 1.0a
//! HMAC-SHA1 signature made with an access token obtained out of band.
//! Albums are addressed by their album key.

use crate::http::{self, body_stream, check_status, transport};
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use picsync_core::CachePolicy;
use picsync_core::config::{AlbumSources, SmugMugConfig};
use picsync_sync::{Download, RemoteItem, SourceApi, SourcePage, SyncError, SyncResult};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Deserialize;
use sha1::Sha1;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const NAMESPACE: &str = AlbumSources::SMUGMUG;

/// Everything but the RFC 3986 unreserved characters is escaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Scheme, authority and path; the query takes part as parameters instead.
fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    }
}

#[derive(Clone)]
struct OAuthSigner {
    consumer_key: String,
    consumer_secret: String,
    token: String,
    token_secret: String,
}

impl OAuthSigner {
    fn authorization(&self, method: &Method, url: &Url) -> SyncResult<String> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        self.authorization_at(method, url, &nonce, timestamp)
    }

    fn authorization_at(
        &self,
        method: &Method,
        url: &Url,
        nonce: &str,
        timestamp: i64,
    ) -> SyncResult<String> {
        let timestamp = timestamp.to_string();
        let oauth = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", "1.0"),
        ];
        let signature = self.signature(method, url, &oauth)?;

        let fields: Vec<String> = oauth
            .iter()
            .copied()
            .chain(std::iter::once(("oauth_signature", signature.as_str())))
            .map(|(key, value)| format!("{key}=\"{}\"", encode(value)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }

    fn signature(&self, method: &Method, url: &Url, oauth: &[(&str, &str)]) -> SyncResult<String> {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (encode(&key), encode(&value)))
            .chain(oauth.iter().map(|(key, value)| (encode(key), encode(value))))
            .collect();
        params.sort();
        let params: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let base = format!(
            "{}&{}&{}",
            method.as_str(),
            encode(&base_url(url)),
            encode(&params.join("&"))
        );
        let key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(&self.token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| SyncError::Api(format!("cannot key request signature: {e}")))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[derive(Clone)]
pub struct SmugMugClient {
    http: reqwest::Client,
    api_base: Url,
    signer: OAuthSigner,
    page_size: u32,
    policy: CachePolicy,
}

impl SmugMugClient {
    pub fn new(config: &SmugMugConfig) -> anyhow::Result<Self> {
        let api_base = Url::parse(&config.api_base).context("invalid smugmug.api_base")?;
        if config.page_size == 0 {
            anyhow::bail!("smugmug.page_size must be at least 1");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_base,
            signer: OAuthSigner {
                consumer_key: config.api_key.clone(),
                consumer_secret: config.api_secret.clone(),
                token: config.access_token.clone(),
                token_secret: config.access_token_secret.clone(),
            },
            page_size: config.page_size,
            policy: config.cache_policy(),
        })
    }

    fn signed(&self, method: Method, url: Url) -> SyncResult<reqwest::RequestBuilder> {
        let authorization = self.signer.authorization(&method, &url)?;
        Ok(self
            .http
            .request(method, url)
            .header(AUTHORIZATION, authorization))
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(rename = "Response")]
    response: ImagesBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagesBody {
    #[serde(default)]
    album_image: Vec<AlbumImage>,
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Pages {
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AlbumImage {
    image_key: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    archived_uri: String,
    date: Option<String>,
    #[serde(default)]
    is_video: bool,
}

impl AlbumImage {
    /// Videos and images without an archive copy cannot be mirrored.
    fn into_remote(self) -> Option<RemoteItem> {
        if self.is_video {
            tracing::debug!(image_key = %self.image_key, "skipping video");
            return None;
        }
        if self.archived_uri.is_empty() {
            tracing::warn!(image_key = %self.image_key, "image has no archive URI, skipping");
            return None;
        }
        let origin_timestamp = self
            .date
            .and_then(|d| OffsetDateTime::parse(&d, &Rfc3339).ok());
        let filename = if self.file_name.is_empty() {
            self.image_key.clone()
        } else {
            self.file_name
        };
        Some(RemoteItem {
            remote_id: self.image_key,
            filename,
            download_uri: self.archived_uri,
            origin_timestamp,
        })
    }
}

#[async_trait]
impl SourceApi for SmugMugClient {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn cache_policy(&self) -> CachePolicy {
        self.policy
    }

    /// Page tokens are the 1-based index of the first image of the page.
    async fn list_album(
        &self,
        album_ref: &str,
        page_token: Option<&str>,
    ) -> SyncResult<SourcePage> {
        let start: u64 = match page_token {
            Some(token) => token
                .parse::<u64>()
                .ok()
                .filter(|start| *start >= 1)
                .ok_or_else(|| SyncError::Api(format!("invalid smugmug page token '{token}'")))?,
            None => 1,
        };

        let mut url = http::join(&self.api_base, &format!("/api/v2/album/{album_ref}!images"))?;
        url.query_pairs_mut()
            .append_pair("start", &start.to_string())
            .append_pair("count", &self.page_size.to_string());
        let response: ImagesResponse =
            http::send_json(self.signed(Method::GET, url)?.header(ACCEPT, "application/json"))
                .await?;

        let body = response.response;
        let listed = body.album_image.len() as u64;
        let has_next = body.pages.and_then(|p| p.next_page).is_some();
        // An empty page cannot advance the cursor.
        let next_page_token = (has_next && listed > 0).then(|| (start + listed).to_string());

        Ok(SourcePage {
            items: body
                .album_image
                .into_iter()
                .filter_map(AlbumImage::into_remote)
                .collect(),
            next_page_token,
        })
    }

    async fn download(&self, uri: &str) -> SyncResult<Download> {
        let url = Url::parse(uri)
            .map_err(|e| SyncError::Api(format!("invalid smugmug archive URI {uri}: {e}")))?;
        let response = self
            .signed(Method::GET, url)?
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Download {
            content_type,
            content_length: response.content_length(),
            stream: body_stream(response),
        })
    }
}
