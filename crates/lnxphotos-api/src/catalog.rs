//! Catalog listing (`GET /v1/mediaItems`)
//!
//! Fetches one page of the library at a time. The caller drives pagination
//! with the opaque `nextPageToken`, which keeps every page fetch a separate,
//! cancellable, rate-limited call.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lnxphotos_api::client::PhotosClient;
//!
//! # async fn example() -> Result<(), lnxphotos_api::ApiError> {
//! let client = PhotosClient::new();
//! let mut token = None;
//! loop {
//!     let page = client.list_media_items("access-token", 100, token.as_ref()).await?;
//!     println!("Got {} items", page.items.len());
//!     match page.next_page_token {
//!         Some(next) => token = Some(next),
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use lnxphotos_core::domain::{MediaItem, MediaItemId, MediaType, PageToken};
use lnxphotos_core::ports::CatalogPage;

use crate::client::PhotosClient;
use crate::ApiError;

/// Path of the list endpoint relative to the API base URL
const MEDIA_ITEMS_PATH: &str = "/v1/mediaItems";

/// `baseUrl` suffix requesting original photo bytes
const PHOTO_DOWNLOAD_SUFFIX: &str = "=d";

/// `baseUrl` suffix requesting original video bytes
const VIDEO_DOWNLOAD_SUFFIX: &str = "=dv";

// ============================================================================
// API response types (JSON deserialization)
// ============================================================================

/// Raw response from `GET /v1/mediaItems`
///
/// An empty library returns `{}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMediaItemsResponse {
    #[serde(default)]
    media_items: Vec<ApiMediaItem>,

    next_page_token: Option<String>,
}

/// One entry of the `mediaItems` array
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMediaItem {
    id: Option<String>,

    #[serde(default)]
    filename: String,

    /// Short-lived URL of the bytes; needs a size suffix to download
    base_url: Option<String>,

    mime_type: Option<String>,

    media_metadata: Option<ApiMediaMetadata>,
}

/// Dimensions and capture metadata
///
/// `width` and `height` are decimal strings in the API; numbers are accepted
/// too.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMediaMetadata {
    creation_time: Option<String>,
    width: Option<serde_json::Value>,
    height: Option<serde_json::Value>,
    /// Present (possibly empty) for photos
    photo: Option<serde_json::Value>,
    /// Present (possibly empty) for videos
    video: Option<serde_json::Value>,
}

// ============================================================================
// CatalogParser
// ============================================================================

/// Converts raw API entries into domain [`MediaItem`]s
pub struct CatalogParser;

impl CatalogParser {
    fn parse_item(raw: ApiMediaItem) -> Result<MediaItem, ApiError> {
        let id = raw
            .id
            .ok_or_else(|| ApiError::InvalidResponse("media item without id".into()))?;
        let id = MediaItemId::new(id).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let base_url = raw.base_url.ok_or_else(|| {
            ApiError::InvalidResponse(format!("media item {id} has no baseUrl"))
        })?;

        let metadata = raw.media_metadata;
        let media_type = Self::media_type(metadata.as_ref(), raw.mime_type.as_deref());
        let suffix = match media_type {
            MediaType::Photo => PHOTO_DOWNLOAD_SUFFIX,
            MediaType::Video => VIDEO_DOWNLOAD_SUFFIX,
        };

        let mut item = MediaItem::new(id, raw.filename, media_type, format!("{base_url}{suffix}"));

        if let Some(mime) = raw.mime_type {
            item = item.with_mime_type(mime);
        }

        if let Some(metadata) = metadata {
            let width = Self::dimension(metadata.width.as_ref());
            let height = Self::dimension(metadata.height.as_ref());
            item = item.with_dimensions(width, height);

            match metadata.creation_time.as_deref().map(DateTime::parse_from_rfc3339) {
                Some(Ok(created)) => item = item.with_creation_time(created.with_timezone(&Utc)),
                Some(Err(e)) => {
                    warn!(item_id = %item.id(), error = %e, "Unparseable creationTime");
                }
                None => {}
            }
        }

        Ok(item)
    }

    fn media_type(metadata: Option<&ApiMediaMetadata>, mime_type: Option<&str>) -> MediaType {
        match metadata {
            Some(m) if m.video.is_some() => MediaType::Video,
            Some(m) if m.photo.is_some() => MediaType::Photo,
            _ if mime_type.is_some_and(|m| m.starts_with("video/")) => MediaType::Video,
            _ => MediaType::Photo,
        }
    }

    fn dimension(value: Option<&serde_json::Value>) -> u32 {
        match value {
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
            Some(serde_json::Value::Number(n)) => {
                n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Parses a full page, skipping malformed entries with a warning
    fn parse_page(raw: ListMediaItemsResponse) -> CatalogPage {
        let mut items = Vec::with_capacity(raw.media_items.len());
        for entry in raw.media_items {
            match Self::parse_item(entry) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "Skipping malformed catalog entry"),
            }
        }

        let next_page_token = raw
            .next_page_token
            .filter(|t| !t.is_empty())
            .and_then(|t| PageToken::new(t).ok());

        CatalogPage {
            items,
            next_page_token,
        }
    }
}

// ============================================================================
// list_media_items
// ============================================================================

impl PhotosClient {
    /// Builds the list URL for one page
    pub fn media_items_url(
        &self,
        page_size: u32,
        page_token: Option<&PageToken>,
    ) -> Result<Url, ApiError> {
        let base = format!("{}{}", self.base_url(), MEDIA_ITEMS_PATH);
        let page_size = page_size.to_string();
        let mut params = vec![("pageSize", page_size.as_str())];
        if let Some(token) = page_token {
            params.push(("pageToken", token.as_str()));
        }
        Url::parse_with_params(&base, &params)
            .map_err(|e| ApiError::InvalidResponse(format!("bad catalog URL {base}: {e}")))
    }

    /// Fetches one catalog page
    pub async fn list_media_items(
        &self,
        access_token: &str,
        page_size: u32,
        page_token: Option<&PageToken>,
    ) -> Result<CatalogPage, ApiError> {
        let url = self.media_items_url(page_size, page_token)?;

        let raw: ListMediaItemsResponse = self
            .execute(Method::GET, url.as_str(), access_token)
            .await?
            .json()
            .await?;

        let page = CatalogParser::parse_page(raw);
        debug!(
            items = page.items.len(),
            has_next = page.next_page_token.is_some(),
            "Received catalog page"
        );
        Ok(page)
    }
}

// ============================================================================
// Tests
// ============================================================================
