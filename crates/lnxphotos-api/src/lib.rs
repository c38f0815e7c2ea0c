//! LNXPhotos API - Photo library HTTP client
//!
//! Provides async client for:
//! - Paginated catalog listing (`mediaItems.list`)
//! - Streaming downloads of original photo and video bytes
//! - Quota-aware request throttling with `Retry-After` backoff
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and status mapping
//! - [`catalog`] - Catalog page DTOs and parsing
//! - [`download`] - Streaming download bodies
//! - [`provider`] - [`ICatalogProvider`](lnxphotos_core::ports::ICatalogProvider) adapter
//! - [`rate_limit`] - Rolling one-minute request limiter

pub mod catalog;
pub mod client;
pub mod download;
pub mod provider;
pub mod rate_limit;

use std::time::Duration;

use lnxphotos_core::ports::ProviderError;
use thiserror::Error;

/// Errors that can occur when communicating with the photo library API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credential lacks the required scope
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; `retry_after` is the provider's hint, if any
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// The request exceeded the configured timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::NetworkError(e)
        }
    }
}

impl From<ApiError> for ProviderError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized(msg) => ProviderError::Unauthorized(msg),
            ApiError::Forbidden(msg) => ProviderError::Unauthorized(format!("forbidden: {msg}")),
            ApiError::NotFound(msg) => ProviderError::NotFound(msg),
            ApiError::TooManyRequests { retry_after } => ProviderError::RateLimited { retry_after },
            ApiError::ServerError { status, message } => ProviderError::Server { status, message },
            ApiError::Timeout(msg) => ProviderError::Timeout(msg),
            ApiError::NetworkError(err) => ProviderError::Network(err.to_string()),
            ApiError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}
