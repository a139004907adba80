//! The entry store contract the feed parser reconciles against.
//!
//! [`Database`] is the production implementation; the parser only ever sees
//! this trait, so tests can drive it with a recording fake.

use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, EntryUpdate, FeedMetadataUpdate, NewEntry};

/// Persistent home of feed and entry rows.
///
/// Every method is a hard failure point for a parse: an `Err` aborts the
/// whole refresh of that feed.
#[allow(async_fn_in_trait)] // Single-threaded driver; no Send bound needed
pub trait EntryStore {
    /// Remove entries dated before `cutoff`. Returns the number removed.
    async fn delete_older_than(
        &self,
        feed_id: i64,
        cutoff: DateTime<Utc>,
        exclude_favorites: bool,
    ) -> Result<u64, DatabaseError>;

    /// Update entries whose link matches exactly. Returns whether one matched.
    async fn update_if_link_matches(
        &self,
        feed_id: i64,
        link: &str,
        update: &EntryUpdate<'_>,
    ) -> Result<bool, DatabaseError>;

    /// Insert a new entry, returning its storage id.
    async fn insert(&self, feed_id: i64, entry: &NewEntry<'_>) -> Result<i64, DatabaseError>;

    async fn update_feed_metadata(
        &self,
        feed_id: i64,
        update: &FeedMetadataUpdate,
    ) -> Result<(), DatabaseError>;
}

impl EntryStore for Database {
    async fn delete_older_than(
        &self,
        feed_id: i64,
        cutoff: DateTime<Utc>,
        exclude_favorites: bool,
    ) -> Result<u64, DatabaseError> {
        self.delete_entries_older_than(feed_id, cutoff, exclude_favorites)
            .await
    }

    async fn update_if_link_matches(
        &self,
        feed_id: i64,
        link: &str,
        update: &EntryUpdate<'_>,
    ) -> Result<bool, DatabaseError> {
        self.update_entry_by_link(feed_id, link, update).await
    }

    async fn insert(&self, feed_id: i64, entry: &NewEntry<'_>) -> Result<i64, DatabaseError> {
        self.insert_entry(feed_id, entry).await
    }

    async fn update_feed_metadata(
        &self,
        feed_id: i64,
        update: &FeedMetadataUpdate,
    ) -> Result<(), DatabaseError> {
        self.apply_feed_metadata(feed_id, update).await
    }
}
