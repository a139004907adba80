use anyhow::Result;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, Entry, EntryDbRow, EntryUpdate, NewEntry};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of entries to return from any single query (OOM protection)
const MAX_ENTRIES: i64 = 2000;

impl Database {
    // ========================================================================
    // Reconciliation Writes
    // ========================================================================

    /// Delete entries of a feed dated before `cutoff`, returning the number removed.
    pub(crate) async fn delete_entries_older_than(
        &self,
        feed_id: i64,
        cutoff: DateTime<Utc>,
        exclude_favorites: bool,
    ) -> Result<u64, DatabaseError> {
        let sql = if exclude_favorites {
            "DELETE FROM entries WHERE feed_id = ? AND date < ? AND favorite = 0"
        } else {
            "DELETE FROM entries WHERE feed_id = ? AND date < ?"
        };
        let result = sqlx::query(sql)
            .bind(feed_id)
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Refresh every entry of `feed_id` whose link equals `link`.
    ///
    /// Returns whether any row matched.
    pub(crate) async fn update_entry_by_link(
        &self,
        feed_id: i64,
        link: &str,
        update: &EntryUpdate<'_>,
    ) -> Result<bool, DatabaseError> {
        let date = update.date.map(|d| d.timestamp());
        let result = sqlx::query(
            r#"
            UPDATE entries SET
                title = ?1,
                description = COALESCE(?2, description),
                date = COALESCE(?3, date),
                read_date = CASE WHEN ?3 IS NULL THEN read_date ELSE NULL END
            WHERE feed_id = ?4 AND link = ?5
        "#,
        )
        .bind(update.title)
        .bind(update.description)
        .bind(date)
        .bind(feed_id)
        .bind(link)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a new unread entry, returning its id.
    pub(crate) async fn insert_entry(
        &self,
        feed_id: i64,
        entry: &NewEntry<'_>,
    ) -> Result<i64, DatabaseError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO entries (feed_id, title, link, description, date)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(feed_id)
        .bind(entry.title)
        .bind(entry.link)
        .bind(entry.description)
        .bind(entry.date.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(id)
    }

    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// Get entries for a feed, newest first, with optional limit
    /// (default 500, hard cap [`MAX_ENTRIES`]).
    pub async fn get_entries_for_feed(&self, feed_id: i64, limit: Option<i64>) -> Result<Vec<Entry>> {
        let limit = limit.unwrap_or(500).min(MAX_ENTRIES);
        tracing::debug!(limit = limit, feed_id = feed_id, "get_entries_for_feed with limit cap");

        let rows = sqlx::query_as::<_, EntryDbRow>(
            r#"
            SELECT id, feed_id, title, link, description, date, read_date, favorite
            FROM entries
            WHERE feed_id = ?
            ORDER BY date DESC, id DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EntryDbRow::into_entry).collect())
    }

    // ========================================================================
    // Entry Mutations
    // ========================================================================

    /// Mark entry as read (idempotent), returns whether it was changed
    pub async fn mark_entry_read(&self, entry_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE entries SET read_date = ? WHERE id = ? AND read_date IS NULL")
                .bind(Utc::now().timestamp())
                .bind(entry_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically toggle the favorite flag, returning the new value.
    ///
    /// Favorites survive the retention sweep.
    pub async fn toggle_entry_favorite(&self, entry_id: i64) -> Result<bool> {
        let result: (bool,) = sqlx::query_as(
            r#"UPDATE entries SET favorite = NOT favorite WHERE id = ? RETURNING favorite"#,
        )
        .bind(entry_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0)
    }
}
