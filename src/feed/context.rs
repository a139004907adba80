use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

use crate::storage::Feed;

/// Everything a single parse needs to know about the feed it is parsing.
#[derive(Debug, Clone)]
pub struct FeedContext {
    pub feed_id: i64,
    /// Entries dated at or before this instant are stale.
    pub last_update: DateTime<Utc>,
    /// Display title already known to the caller. When present, the feed's
    /// own title is ignored.
    pub title: Option<String>,
    /// Entries dated at or before this instant are outside the retention window.
    pub retention_cutoff: DateTime<Utc>,
    /// Root for cached images.
    pub images_dir: PathBuf,
    pub fetch_images: bool,
}

impl FeedContext {
    /// Builds the context for a stored feed, with the retention window
    /// ending `keep` before now. A feed never refreshed has
    /// `last_update` at the Unix epoch.
    pub fn for_feed(feed: &Feed, keep: Duration, images_dir: PathBuf, fetch_images: bool) -> Self {
        let last_update = feed
            .last_update
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::UNIX_EPOCH);

        Self {
            feed_id: feed.id,
            last_update,
            title: feed.title.as_deref().map(str::to_string),
            retention_cutoff: Utc::now() - keep,
            images_dir,
            fetch_images,
        }
    }
}

/// Result of one parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Entries inserted (not updated) during this parse.
    pub new_count: usize,
    /// The feed's root element closed or a stale entry stopped the parse.
    pub done: bool,
}
