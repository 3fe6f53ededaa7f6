// Fetcher: retrieves raw bytes for playlists, keys and segments.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::DownloadError;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the full body behind `url`.
    ///
    /// A zero `timeout` means the request has no deadline. Responses with a
    /// non-success status are errors, never empty bodies.
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Bytes, DownloadError>;
}

pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Bytes, DownloadError> {
        let mut request_builder = self.http_client.get(url).headers(headers.clone());
        if !timeout.is_zero() {
            request_builder = request_builder.timeout(timeout);
        }

        let response = request_builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::StatusCode {
                status,
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
