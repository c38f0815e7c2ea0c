//! Catalog provider port (driven/secondary port)
//!
//! This module defines the interface to the remote photo library: listing
//! the catalog page by page and opening a byte stream for one item.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports, errors here are typed ([`ProviderError`]) so
//!   the sync engines can tell "reauthenticate" apart from "try again later"
//!   without inspecting strings.
//! - Downloads are pulled chunk by chunk through [`DownloadBody`] so a file
//!   never needs to fit in memory.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::media_item::MediaItem;
use crate::domain::newtypes::{PageToken, UserId};

// ============================================================================
// AuthContext
// ============================================================================

/// Validated credential for the authenticated library owner
///
/// The OAuth handshake happens elsewhere; the core only carries the bearer
/// token and the identity it belongs to.
#[derive(Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub access_token: String,
}

impl AuthContext {
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// ProviderError
// ============================================================================

/// Failure talking to the remote catalog
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Credential rejected (HTTP 401/403); the user must reauthenticate
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Provider throttled the request
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (reset, DNS, TLS, truncated body)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider-side failure (HTTP 5xx)
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Item no longer exists remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the error means the credential is no longer usable
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) | Self::Server { .. }
        )
    }
}

// ============================================================================
// CatalogPage / DownloadBody
// ============================================================================

/// One page of the remote catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub items: Vec<MediaItem>,
    /// Token for the next page; `None` on the last page
    pub next_page_token: Option<PageToken>,
}

/// Streaming body of an in-progress download
#[async_trait::async_trait]
pub trait DownloadBody: Send {
    /// Length advertised by the provider, if any
    fn content_length(&self) -> Option<u64>;

    /// Next chunk of bytes, or `None` once the body is exhausted
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProviderError>;
}

// ============================================================================
// ICatalogProvider trait
// ============================================================================

/// Port for the remote photo library
///
/// Implementations are expected to route every call through the provider's
/// rate limiter.
#[async_trait::async_trait]
pub trait ICatalogProvider: Send + Sync {
    /// Fetches one page of the catalog
    ///
    /// # Arguments
    /// * `auth` - Credential for the library owner
    /// * `page_size` - Maximum items to return
    /// * `page_token` - Continuation token from the previous page, `None` for the first
    async fn list_page(
        &self,
        auth: &AuthContext,
        page_size: u32,
        page_token: Option<&PageToken>,
    ) -> Result<CatalogPage, ProviderError>;

    /// Opens a byte stream for the item's original content
    async fn open_download(
        &self,
        auth: &AuthContext,
        item: &MediaItem,
    ) -> Result<Box<dyn DownloadBody>, ProviderError>;
}
