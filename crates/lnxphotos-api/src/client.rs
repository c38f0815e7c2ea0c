//! Photo library HTTP client
//!
//! Provides a typed HTTP client for the photo library API. Handles bearer
//! authentication, per-request timeouts, status code mapping and routing
//! every request through the shared [`RateLimiter`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lnxphotos_api::client::PhotosClient;
//!
//! # async fn example() -> Result<(), lnxphotos_api::ApiError> {
//! let client = PhotosClient::new();
//! let page = client.list_media_items("access-token", 100, None).await?;
//! println!("{} items", page.items.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::rate_limit::{parse_retry_after, RateLimiter};
use crate::ApiError;

/// Base URL of the photo library API
pub const DEFAULT_BASE_URL: &str = "https://photoslibrary.googleapis.com";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest error body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 512;

// ============================================================================
// PhotosClient
// ============================================================================

/// HTTP client for photo library API calls
///
/// Cheap to clone; clones share the connection pool and the rate limiter.
#[derive(Clone)]
pub struct PhotosClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Timeout applied to each request (and each download chunk)
    timeout: Duration,
    /// Shared limiter consulted before every request
    rate_limiter: Arc<RateLimiter>,
}

impl PhotosClient {
    /// Creates a client for the production API with default throttling
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            rate_limiter: Arc::new(RateLimiter::default()),
        }
    }

    /// Overrides the base URL (useful for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shares `limiter` with this client
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Creates an authenticated request builder for an absolute `url`
    pub fn request(&self, method: Method, url: &str, access_token: &str) -> RequestBuilder {
        self.streaming_request(method, url, access_token)
            .timeout(self.timeout)
    }

    /// Like [`request`](Self::request) but without a whole-request timeout,
    /// for bodies that are read incrementally
    pub(crate) fn streaming_request(
        &self,
        method: Method,
        url: &str,
        access_token: &str,
    ) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(access_token)
    }

    /// Sends a request through the rate limiter and maps error statuses.
    ///
    /// A 429 is retried once by the limiter after its backoff; any other
    /// non-success status becomes the matching [`ApiError`].
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        access_token: &str,
    ) -> Result<Response, ApiError> {
        self.rate_limiter
            .execute(|| {
                let request = self.request(method.clone(), url, access_token);
                async move {
                    debug!(url, "Sending request");
                    let response = request.send().await?;
                    check_status(response).await
                }
            })
            .await
    }
}

impl Default for PhotosClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a response's status code onto [`ApiError`]
pub(crate) async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(ApiError::TooManyRequests { retry_after });
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let message = if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body
    };

    warn!(status = status.as_u16(), url = %url, "Request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(url),
        s if s.is_server_error() => ApiError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => ApiError::InvalidResponse(format!("unexpected status {}: {}", s.as_u16(), message)),
    })
}
