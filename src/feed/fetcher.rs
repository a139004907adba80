use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::context::FeedContext;
use super::handler::{parse_feed, ParseError};
use crate::config::Config;
use crate::content::{read_limited_bytes, BodyError, ImageFetch};
use crate::storage::{Database, Feed};
use crate::util::{validate_url, HostPolicy, UrlValidationError};

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while refreshing a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Feed URL rejected before any request was made
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Feed document is not well-formed XML
    #[error("Parse error: {0}")]
    Parse(String),
    /// Entry store failed while reconciling
    #[error("Database error: {0}")]
    Database(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Received fewer bytes than Content-Length
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl From<BodyError> for FetchError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Network(e) => FetchError::Network(e),
            BodyError::TooLarge(_) => FetchError::ResponseTooLarge,
            BodyError::Incomplete { expected, received } => {
                FetchError::IncompleteResponse { expected, received }
            }
        }
    }
}

impl From<ParseError> for FetchError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Xml { .. } => FetchError::Parse(err.to_string()),
            ParseError::Store(e) => FetchError::Database(e.to_string()),
        }
    }
}

/// Settings shared by every feed in a refresh run.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Retention window.
    pub keep: chrono::Duration,
    pub images_dir: PathBuf,
    pub fetch_images: bool,
    pub timeout: Duration,
    pub host_policy: HostPolicy,
}

impl RefreshOptions {
    pub fn from_config(config: &Config, config_dir: &Path) -> Self {
        Self {
            keep: config.keep(),
            images_dir: config.images_dir(config_dir),
            fetch_images: config.fetch_images,
            timeout: config.request_timeout(),
            host_policy: config.host_policy(),
        }
    }
}

/// Result of a single feed refresh.
#[derive(Debug)]
pub struct FetchResult {
    pub feed_id: i64,
    /// Number of new entries inserted, or the error that occurred
    pub result: Result<usize, FetchError>,
}

/// Refreshes feeds one after another.
///
/// Feeds with [`Database::CIRCUIT_BREAKER_THRESHOLD`] or more consecutive
/// failures are skipped; use [`refresh_one`] to retry them explicitly.
/// Results are returned in input order.
pub async fn refresh_all<I: ImageFetch>(
    db: &Database,
    client: &reqwest::Client,
    images: &I,
    feeds: &[Feed],
    options: &RefreshOptions,
) -> Vec<FetchResult> {
    let active_feeds: Vec<&Feed> = feeds
        .iter()
        .filter(|f| f.consecutive_failures < Database::CIRCUIT_BREAKER_THRESHOLD)
        .collect();

    let skipped = feeds.len() - active_feeds.len();
    if skipped > 0 {
        tracing::info!(
            skipped = skipped,
            threshold = Database::CIRCUIT_BREAKER_THRESHOLD,
            "Skipping feeds due to consecutive failures (use --feed to force refresh)"
        );
    }

    // Sequential: each parse owns the store for its feed until it finishes
    stream::iter(active_feeds)
        .then(|feed| refresh_one(db, client, images, feed, options))
        .collect()
        .await
}

/// Refreshes a single feed and records the outcome on the feed row.
///
/// Bypasses the circuit breaker. On success the failure counter is reset;
/// on failure the error message is stored and the counter incremented.
pub async fn refresh_one<I: ImageFetch>(
    db: &Database,
    client: &reqwest::Client,
    images: &I,
    feed: &Feed,
    options: &RefreshOptions,
) -> FetchResult {
    let result = fetch_one(db, client, images, feed, options).await;
    record_fetch_result(db, feed, &result).await;

    FetchResult {
        feed_id: feed.id,
        result,
    }
}

/// Fire-and-forget: database errors here are logged, never returned.
async fn record_fetch_result<T>(db: &Database, feed: &Feed, result: &Result<T, FetchError>) {
    match result {
        Ok(_) => {
            if let Err(e) = db.set_feed_error(feed.id, None).await {
                tracing::warn!(feed_id = feed.id, error = %e, "Failed to clear feed error");
            }
            if let Err(e) = db.reset_feed_failures(feed.id).await {
                tracing::warn!(feed_id = feed.id, error = %e, "Failed to reset feed failure count");
            }
        }
        Err(e) => {
            tracing::warn!(feed = %feed.url, error = %e, "Feed refresh failed");
            if let Err(db_err) = db.set_feed_error(feed.id, Some(&e.to_string())).await {
                tracing::warn!(feed_id = feed.id, error = %db_err, "Failed to record feed error");
            }
            match db.increment_feed_failures(feed.id).await {
                Ok(failures) if failures >= Database::CIRCUIT_BREAKER_THRESHOLD => {
                    tracing::info!(
                        feed_id = feed.id,
                        title = %feed.display_title(),
                        failures = failures,
                        "Feed circuit breaker tripped - will be skipped until manual retry"
                    );
                }
                Ok(_) => {}
                Err(db_err) => {
                    tracing::warn!(
                        feed_id = feed.id,
                        error = %db_err,
                        "Failed to increment feed failure count"
                    );
                }
            }
        }
    }
}

async fn fetch_one<I: ImageFetch>(
    db: &Database,
    client: &reqwest::Client,
    images: &I,
    feed: &Feed,
    options: &RefreshOptions,
) -> Result<usize, FetchError> {
    // SEC-001: feed URLs are user input
    let url = validate_url(&feed.url, options.host_policy)?;
    let bytes = download(client, &url, options.timeout).await?;

    let ctx = FeedContext::for_feed(
        feed,
        options.keep,
        options.images_dir.clone(),
        options.fetch_images,
    );
    let outcome = parse_feed(bytes.as_slice(), &ctx, db, images).await?;
    tracing::info!(
        feed_id = feed.id,
        new_entries = outcome.new_count,
        "Feed refreshed"
    );

    Ok(outcome.new_count)
}

/// GET with exponential backoff on 429, 5xx and truncated bodies.
async fn download(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let mut retry_count = 0;

    loop {
        let response = tokio::time::timeout(timeout, client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::Timeout)??;
        let status = response.status();

        // EDGE-004: Handle rate limiting with exponential backoff
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::RateLimited(MAX_RETRIES));
            }
            let delay_secs = 2u64.pow(retry_count); // 1s, 2s, 4s
            tracing::warn!(
                feed = %url,
                retry = retry_count,
                delay_secs = delay_secs,
                "Rate limited, backing off"
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        if status.is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            let delay_secs = 2u64.pow(retry_count);
            tracing::warn!(
                feed = %url,
                status = %status,
                retry = retry_count,
                delay_secs = delay_secs,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        // 4xx errors fail immediately
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => return Ok(bytes),
            Err(BodyError::Incomplete { expected, received }) => {
                // EDGE-005: Retry incomplete downloads
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }
                let delay_secs = 2u64.pow(retry_count);
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    delay_secs = delay_secs,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
