#[path = "../src/http.rs"]
#[allow(dead_code)]
mod http;

#[path = "../src/smugmug.rs"]
mod smugmug;

use futures::StreamExt;
use httpmock::Method::GET;
use httpmock::MockServer;
use picsync_core::CachePolicy;
use picsync_core::config::SmugMugConfig;
use picsync_sync::{SourceApi, SyncError, TransferError};
use serde_json::json;
use smugmug::SmugMugClient;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn config(api_base: String) -> SmugMugConfig {
    SmugMugConfig {
        api_key: "consumer-key".to_string(),
        api_secret: "consumer-secret".to_string(),
        access_token: "access-token".to_string(),
        access_token_secret: "access-secret".to_string(),
        api_base,
        page_size: 2,
        revalidate_after: None,
    }
}

fn client(server: &MockServer) -> SmugMugClient {
    SmugMugClient::new(&config(server.base_url())).unwrap()
}

#[test]
fn zero_page_size_is_rejected() {
    let mut config = config("https://api.smugmug.com".to_string());
    config.page_size = 0;
    assert!(SmugMugClient::new(&config).is_err());
}

#[tokio::test]
async fn list_album_pages_by_start_index() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/album/AbC123!images")
            .query_param("start", "1")
            .query_param("count", "2")
            .header("accept", "application/json")
            .header_exists("authorization");
        then.status(200).json_body(json!({
            "Response": {
                "AlbumImage": [
                    {
                        "ImageKey": "k1",
                        "FileName": "beach.jpg",
                        "ArchivedUri": "https://photos.example/k1.jpg",
                        "ArchivedMD5": "0cc175b9c0f1b6a831c399e269772661",
                        "Date": "2024-05-01T10:00:00+00:00"
                    },
                    {
                        "ImageKey": "k2",
                        "FileName": "",
                        "ArchivedUri": "https://photos.example/k2.jpg"
                    }
                ],
                "Pages": {
                    "Total": 4,
                    "Start": 1,
                    "Count": 2,
                    "NextPage": "/api/v2/album/AbC123!images?start=3&count=2"
                }
            },
            "Code": 200,
            "Message": "Ok"
        }));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/album/AbC123!images")
            .query_param("start", "3")
            .query_param("count", "2");
        then.status(200).json_body(json!({
            "Response": {
                "AlbumImage": [
                    { "ImageKey": "k3", "FileName": "clip.mp4", "ArchivedUri": "https://photos.example/k3.mp4", "IsVideo": true },
                    { "ImageKey": "k4", "FileName": "dog.jpg", "ArchivedUri": "https://photos.example/k4.jpg" }
                ],
                "Pages": { "Total": 4, "Start": 3, "Count": 2 }
            }
        }));
    });

    let sm = client(&server);
    assert_eq!(sm.namespace(), smugmug::NAMESPACE);
    assert_eq!(sm.cache_policy(), CachePolicy::Immutable);

    let page = sm.list_album("AbC123", None).await.unwrap();
    assert_eq!(page.next_page_token.as_deref(), Some("3"));
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].remote_id, "k1");
    assert_eq!(page.items[0].filename, "beach.jpg");
    assert_eq!(page.items[0].download_uri, "https://photos.example/k1.jpg");
    assert_eq!(
        page.items[0].origin_timestamp.map(|t| t.unix_timestamp()),
        Some(1_714_557_600)
    );
    // A missing filename falls back to the image key.
    assert_eq!(page.items[1].filename, "k2");

    let page = sm.list_album("AbC123", Some("3")).await.unwrap();
    assert!(page.next_page_token.is_none());
    // The video is not mirrored.
    let keys: Vec<_> = page.items.iter().map(|i| i.remote_id.as_str()).collect();
    assert_eq!(keys, vec!["k4"]);

    first.assert_hits(1);
    second.assert_hits(1);
}

#[tokio::test]
async fn empty_page_ends_listing_even_with_next_page() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v2/album/AbC123!images");
        then.status(200).json_body(json!({
            "Response": { "Pages": { "NextPage": "/api/v2/album/AbC123!images?start=1" } }
        }));
    });

    let page = client(&server).list_album("AbC123", None).await.unwrap();
    assert!(page.items.is_empty());
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn invalid_page_token_is_an_api_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let sm = client(&server);
    for token in ["next", "0"] {
        let err = sm.list_album("AbC123", Some(token)).await.unwrap_err();
        assert!(matches!(err, SyncError::Api(_)));
    }
}

#[tokio::test]
async fn download_is_signed_and_streamed() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let archive = server.mock(|when, then| {
        when.method(GET)
            .path("/archive/k1.jpg")
            .header_exists("authorization");
        then.status(200)
            .header("content-type", "image/jpeg")
            .body("archived bytes");
    });
    server.mock(|when, then| {
        when.method(GET).path("/archive/gone.jpg");
        then.status(404);
    });

    let sm = client(&server);
    let download = sm.download(&server.url("/archive/k1.jpg")).await.unwrap();
    assert_eq!(download.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(download.content_length, Some(14));

    let mut body = Vec::new();
    let mut stream = download.stream;
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"archived bytes");
    archive.assert_hits(1);

    let err = sm
        .download(&server.url("/archive/gone.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Transfer(TransferError::Status { status: 404, .. })
    ));
}
