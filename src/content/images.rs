use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::{read_limited_bytes, BodyError, ImageFetch};
use crate::util::{validate_url, HostPolicy, UrlValidationError};

const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error(transparent)]
    Body(#[from] BodyError),
    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads entry images over HTTP into the image cache.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    timeout: Duration,
    policy: HostPolicy,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            policy: HostPolicy::PublicOnly,
        }
    }

    /// Allows images on private or loopback hosts.
    pub fn with_host_policy(mut self, policy: HostPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Downloads `url` to `path`, creating parent directories as needed.
    /// Returns the number of bytes written.
    pub async fn download(&self, url: &str, path: &Path) -> Result<usize, ImageError> {
        // SEC-001: image URLs come straight from feed markup
        let url = validate_url(url, self.policy)?;

        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| ImageError::Timeout)??;

        if !response.status().is_success() {
            return Err(ImageError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_IMAGE_SIZE).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;

        Ok(bytes.len())
    }
}

impl ImageFetch for HttpImageFetcher {
    async fn fetch_and_store(&self, url: &str, path: &Path) -> bool {
        match self.download(url, path).await {
            Ok(size) => {
                tracing::debug!(url = %url, path = %path.display(), size = size, "Cached entry image");
                true
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to cache entry image");
                false
            }
        }
    }
}
