use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Another feedsync process appears to be running. Please wait for it to finish.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// lock contention from the caller's point of view.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed query with unread count
pub(crate) type FeedRow = (
    i64,
    Option<String>,
    String,
    Option<i64>,
    Option<String>,
    i64,
    i64, // consecutive_failures
);

/// Internal row type for entry queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub date: i64,
    pub read_date: Option<i64>,
    pub favorite: bool,
}

impl EntryDbRow {
    pub(crate) fn into_entry(self) -> Entry {
        Entry {
            id: self.id,
            feed_id: self.feed_id,
            title: Arc::from(self.title),
            link: self.link,
            description: self.description.map(Arc::from),
            date: self.date,
            read_date: self.read_date,
            favorite: self.favorite,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed row as stored in the database.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    /// Display title; `None` until the user names the feed or the feed's own
    /// title is learned on first refresh.
    pub title: Option<Arc<str>>,
    pub url: String,
    /// Unix seconds of the last successful refresh; entries not newer than this are stale.
    pub last_update: Option<i64>,
    pub error: Option<String>,
    pub unread_count: i64,
    /// Number of consecutive refresh failures (circuit breaker)
    pub consecutive_failures: i64,
}

/// Stored feed entry.
///
/// `description` keeps image placeholders unresolved; see
/// [`crate::feed::resolve_image_placeholders`].
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub title: Arc<str>,
    pub link: String,
    pub description: Option<Arc<str>>,
    pub date: i64,
    pub read_date: Option<i64>,
    pub favorite: bool,
}

impl Feed {
    /// Title for display, falling back to the URL.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

impl Entry {
    pub fn is_read(&self) -> bool {
        self.read_date.is_some()
    }
}

/// Fields written when an existing entry (matched by link) is refreshed.
///
/// `None` leaves the stored column untouched. A present `date` also clears
/// the read marker so the entry resurfaces as unread.
#[derive(Debug, Clone, Copy)]
pub struct EntryUpdate<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub date: Option<DateTime<Utc>>,
}

/// A brand new entry row.
#[derive(Debug, Clone, Copy)]
pub struct NewEntry<'a> {
    pub link: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub date: DateTime<Utc>,
}

/// Feed-level fields refreshed once per parse, before the first entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMetadataUpdate {
    /// New display title, only when the caller did not supply one.
    pub title: Option<String>,
    pub last_update: DateTime<Utc>,
}
