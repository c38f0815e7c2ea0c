//! Integration tests for media downloads through the provider port

use lnxphotos_api::provider::PhotosCatalogProvider;
use lnxphotos_core::domain::{MediaItem, MediaItemId, MediaType};
use lnxphotos_core::ports::{ICatalogProvider, ProviderError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn photo(server_uri: &str, id: &str) -> MediaItem {
    MediaItem::new(
        MediaItemId::new(id.to_string()).unwrap(),
        format!("{id}.jpg"),
        MediaType::Photo,
        format!("{server_uri}/bytes/{id}=d"),
    )
}

#[tokio::test]
async fn test_download_streams_full_content() {
    let (server, client) = common::setup_photos_mock().await;
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    common::mount_download(&server, "photo-001", &content).await;

    let provider = PhotosCatalogProvider::new(client);
    let item = photo(&server.uri(), "photo-001");
    let mut body = provider
        .open_download(&common::auth(), &item)
        .await
        .expect("open download failed");

    assert_eq!(body.content_length(), Some(content.len() as u64));
    let mut received = Vec::new();
    while let Some(chunk) = body.next_chunk().await.unwrap() {
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, content);
}

#[tokio::test]
async fn test_download_of_missing_item_is_not_found() {
    let (server, client) = common::setup_photos_mock().await;
    Mock::given(method("GET"))
        .and(path("/bytes/gone=d"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let provider = PhotosCatalogProvider::new(client);
    let result = provider
        .open_download(&common::auth(), &photo(&server.uri(), "gone"))
        .await;
    assert!(matches!(result, Err(ProviderError::NotFound(_))));
}

#[tokio::test]
async fn test_download_server_error_is_transient() {
    let (server, client) = common::setup_photos_mock().await;
    Mock::given(method("GET"))
        .and(path("/bytes/flaky=d"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = PhotosCatalogProvider::new(client);
    let err = provider
        .open_download(&common::auth(), &photo(&server.uri(), "flaky"))
        .await
        .err()
        .expect("500 should fail");
    assert!(err.is_transient());
}
