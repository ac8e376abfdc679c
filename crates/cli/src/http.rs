//! Response handling shared by the service adapters.

use futures::StreamExt;
use picsync_sync::{ByteStream, SyncError, SyncResult, TransferError};
use reqwest::Url;
use serde::de::DeserializeOwned;

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

pub fn transport(err: reqwest::Error) -> SyncError {
    TransferError::Transport(err.to_string()).into()
}

pub fn join(base: &Url, path: &str) -> SyncResult<Url> {
    base.join(path)
        .map_err(|e| SyncError::Api(format!("failed to build URL from {base} and {path}: {e}")))
}

/// Turn a non-success response into a [`TransferError::Status`].
pub async fn check_status(response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(TransferError::Status {
        url,
        status: status.as_u16(),
        body: truncate(body),
    }
    .into())
}

pub async fn send_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> SyncResult<T> {
    let response = check_status(req.send().await.map_err(transport)?).await?;
    let url = response.url().to_string();
    let body = response.text().await.map_err(transport)?;
    serde_json::from_str(&body)
        .map_err(|e| SyncError::Api(format!("{url}: {e}: {}", truncate(body))))
}

pub async fn send_empty(req: reqwest::RequestBuilder) -> SyncResult<()> {
    check_status(req.send().await.map_err(transport)?).await?;
    Ok(())
}

/// Stream a response body without buffering it.
pub fn body_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransferError::Stream(e.to_string()))),
    )
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}
