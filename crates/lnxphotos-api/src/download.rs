//! Streaming downloads of original media bytes
//!
//! A download is a plain authenticated `GET` of the item's download URL. The
//! body is pulled chunk by chunk and every chunk read is bounded by the
//! client timeout, so a stalled transfer fails instead of hanging a worker.

use std::time::Duration;

use reqwest::{Method, Response};
use tracing::debug;

use lnxphotos_core::ports::{DownloadBody, ProviderError};

use crate::client::PhotosClient;
use crate::ApiError;

/// Body of an open download response
pub struct ResponseBody {
    response: Response,
    timeout: Duration,
    received: u64,
}

impl ResponseBody {
    fn new(response: Response, timeout: Duration) -> Self {
        Self {
            response,
            timeout,
            received: 0,
        }
    }

    /// Bytes read from the body so far
    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait::async_trait]
impl DownloadBody for ResponseBody {
    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProviderError> {
        let chunk = tokio::time::timeout(self.timeout, self.response.chunk())
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "no data for {}s after {} bytes",
                    self.timeout.as_secs(),
                    self.received
                ))
            })?
            .map_err(|e| ProviderError::from(ApiError::from(e)))?;

        Ok(chunk.map(|bytes| {
            self.received += bytes.len() as u64;
            bytes.to_vec()
        }))
    }
}

impl PhotosClient {
    /// Opens a streaming download of `url`
    ///
    /// Only the response headers are awaited here; the bytes are pulled
    /// through the returned [`ResponseBody`].
    pub async fn open_download(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<ResponseBody, ApiError> {
        // The per-request timeout covers the whole transfer in reqwest, which
        // would cap large videos; chunk reads are bounded individually instead.
        let response = self
            .rate_limiter()
            .execute(|| {
                let request = self.streaming_request(Method::GET, url, access_token);
                async move {
                    let response = tokio::time::timeout(self.timeout(), request.send())
                        .await
                        .map_err(|_| ApiError::Timeout(format!("no response from {url}")))??;
                    crate::client::check_status(response).await
                }
            })
            .await?;

        debug!(
            url,
            content_length = ?response.content_length(),
            "Download started"
        );
        Ok(ResponseBody::new(response, self.timeout()))
    }
}
