//! Fetching content referenced by feed entries.

mod images;

pub use images::{HttpImageFetcher, ImageError};

use futures::StreamExt;
use std::path::Path;
use thiserror::Error;

/// Downloads an image and stores it at a local path.
///
/// Implementations report failure by returning `false`; a missing image
/// never fails the surrounding parse.
#[allow(async_fn_in_trait)]
pub trait ImageFetch {
    async fn fetch_and_store(&self, url: &str, path: &Path) -> bool;
}

/// Errors from reading a size-limited response body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Response too large: {0} bytes exceeds limit")]
    TooLarge(usize),

    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: usize },
}

/// Streams a response body, stopping at `limit` bytes.
///
/// SEC-001: the body is never buffered past the limit, whatever
/// Content-Length claims.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(BodyError::TooLarge(len as usize));
        }
    }

    let expected_len = response.content_length();
    let mut stream = response.bytes_stream();
    let mut bytes = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge(bytes.len().saturating_add(chunk.len())));
        }
        bytes.extend_from_slice(&chunk);
    }

    // A connection dropped mid-transfer yields a short body without an error.
    if let Some(expected) = expected_len {
        if (bytes.len() as u64) < expected {
            return Err(BodyError::Incomplete {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
