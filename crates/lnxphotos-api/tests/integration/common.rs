//! Shared test helpers for photo library API integration tests

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lnxphotos_api::client::PhotosClient;
use lnxphotos_api::rate_limit::{RateLimitConfig, RateLimiter};
use lnxphotos_core::domain::UserId;
use lnxphotos_core::ports::AuthContext;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a client pointed at it
///
/// The limiter's fallback backoff is shortened so 429 tests stay quick.
pub async fn setup_photos_mock() -> (MockServer, PhotosClient) {
    let server = MockServer::start().await;
    let limiter = RateLimiter::new(RateLimitConfig {
        default_retry_after: Duration::from_millis(50),
        ..RateLimitConfig::default()
    });
    let client = PhotosClient::new()
        .with_base_url(server.uri())
        .with_timeout(Duration::from_secs(5))
        .with_rate_limiter(Arc::new(limiter));
    (server, client)
}

pub fn auth() -> AuthContext {
    AuthContext::new(UserId::new("user-test-001".to_string()).unwrap(), ACCESS_TOKEN)
}

/// JSON for one photo entry whose bytes live under `/bytes/{id}` on `server`
pub fn photo_json(server: &MockServer, id: &str, created: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "filename": format!("{id}.jpg"),
        "baseUrl": format!("{}/bytes/{id}", server.uri()),
        "mimeType": "image/jpeg",
        "mediaMetadata": {
            "creationTime": created,
            "width": "4000",
            "height": "3000",
            "photo": {}
        }
    })
}

/// Mounts a list endpoint returning one final page
pub async fn mount_list_single_page(server: &MockServer, items: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1/mediaItems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mediaItems": items,
        })))
        .mount(server)
        .await;
}

/// Mounts a two-page listing
///
/// The first request (no token) gets page 1 with `nextPageToken=page-2`; a
/// request carrying that token gets page 2.
#[allow(dead_code)]
pub async fn mount_list_paginated(
    server: &MockServer,
    page1_items: serde_json::Value,
    page2_items: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/v1/mediaItems"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mediaItems": page2_items,
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/mediaItems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mediaItems": page1_items,
            "nextPageToken": "page-2",
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Mounts the original-bytes endpoint for a photo
pub async fn mount_download(server: &MockServer, item_id: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/bytes/{item_id}=d")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "image/jpeg"),
        )
        .mount(server)
        .await;
}
