use anyhow::Result;
use std::sync::Arc;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedMetadataUpdate, FeedRow};

const FEED_SELECT: &str = r#"
    SELECT
        f.id, f.title, f.url, f.last_update, f.error,
        COUNT(CASE WHEN e.id IS NOT NULL AND e.read_date IS NULL THEN 1 END) as unread_count,
        f.consecutive_failures
    FROM feeds f
    LEFT JOIN entries e ON f.id = e.feed_id
"#;

fn feed_from_row(row: FeedRow) -> Feed {
    let (id, title, url, last_update, error, unread_count, consecutive_failures) = row;
    Feed {
        id,
        title: title.map(Arc::from),
        url,
        last_update,
        error,
        unread_count,
        consecutive_failures,
    }
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe to a feed, returning its id.
    ///
    /// A `title` given here is treated as user-chosen and is never replaced by
    /// the feed's own title. Re-adding a known URL keeps the existing id and
    /// only overwrites the title when a new one is supplied.
    pub async fn insert_feed(&self, url: &str, title: Option<&str>) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (title, url) VALUES (?, ?)
            ON CONFLICT(url) DO UPDATE SET title = COALESCE(excluded.title, feeds.title)
            RETURNING id
        "#,
        )
        .bind(title)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Get all feeds with their unread entry counts
    pub async fn get_feeds(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "{FEED_SELECT} GROUP BY f.id ORDER BY COALESCE(f.title, f.url)"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(feed_from_row).collect())
    }

    /// Get a single feed by id
    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "{FEED_SELECT} WHERE f.id = ? GROUP BY f.id"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(feed_from_row))
    }

    /// Set or clear the error status for a feed
    pub async fn set_feed_error(&self, feed_id: i64, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE feeds SET error = ? WHERE id = ?")
            .bind(error)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply the once-per-parse feed refresh: optional new title, cleared
    /// error, new `last_update`.
    pub(crate) async fn apply_feed_metadata(
        &self,
        feed_id: i64,
        update: &FeedMetadataUpdate,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE feeds SET title = COALESCE(?, title), error = NULL, last_update = ? WHERE id = ?",
        )
        .bind(update.title.as_deref())
        .bind(update.last_update.timestamp())
        .bind(feed_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    // ========================================================================
    // Circuit Breaker Operations
    // ========================================================================

    /// Threshold for consecutive failures before a feed is skipped
    pub const CIRCUIT_BREAKER_THRESHOLD: i64 = 5;

    /// Increment consecutive failure count for a feed.
    ///
    /// Returns the new failure count. Once it reaches
    /// [`Self::CIRCUIT_BREAKER_THRESHOLD`] the feed is skipped by bulk refresh.
    pub async fn increment_feed_failures(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let result: (i64,) = sqlx::query_as(
            "UPDATE feeds SET consecutive_failures = consecutive_failures + 1
             WHERE id = ? RETURNING consecutive_failures",
        )
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(result.0)
    }

    /// Reset consecutive failure count for a feed after a successful refresh.
    pub async fn reset_feed_failures(&self, feed_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET consecutive_failures = 0 WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
