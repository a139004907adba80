use chrono::Utc;

use super::context::FeedContext;
use super::draft::EntryDraft;
use super::images::{extract_images, ImageReference};
use crate::content::ImageFetch;
use crate::storage::{DatabaseError, EntryStore, EntryUpdate, NewEntry};
use crate::util::sanitize_title;

/// Why an entry was dropped without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingTitle,
    MissingLink,
}

/// What the reconciler did with one completed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    Inserted { entry_id: i64 },
    /// A stored entry with the same link was refreshed in place.
    UpdatedExisting,
    /// The entry is no newer than the last refresh or outside the retention
    /// window. Feeds list newest first, so the rest of the document is
    /// stale too and the parse should stop.
    SkippedStale,
    SkippedNoChange(SkipReason),
}

impl RetentionDecision {
    pub fn stops_parse(&self) -> bool {
        matches!(self, RetentionDecision::SkippedStale)
    }
}

/// Decides, per completed entry, whether to insert, update or drop it.
pub struct Reconciler<'a, S, I> {
    ctx: &'a FeedContext,
    store: &'a S,
    images: &'a I,
}

impl<'a, S: EntryStore, I: ImageFetch> Reconciler<'a, S, I> {
    pub fn new(ctx: &'a FeedContext, store: &'a S, images: &'a I) -> Self {
        Self { ctx, store, images }
    }

    /// Reconciles one entry with the store.
    ///
    /// # Errors
    ///
    /// Only store failures are returned; image download failures are logged
    /// and otherwise ignored.
    pub async fn reconcile(&self, draft: EntryDraft) -> Result<RetentionDecision, DatabaseError> {
        // Markup-only titles sanitize to nothing and count as missing
        let Some(title) = draft
            .title
            .as_deref()
            .map(sanitize_title)
            .filter(|title| !title.is_empty())
        else {
            tracing::debug!(feed_id = self.ctx.feed_id, link = %draft.link.trim(), "Dropping entry without title");
            return Ok(RetentionDecision::SkippedNoChange(SkipReason::MissingTitle));
        };

        if let Some(date) = draft.date {
            if date <= self.ctx.last_update || date <= self.ctx.retention_cutoff {
                tracing::debug!(
                    feed_id = self.ctx.feed_id,
                    date = %date,
                    last_update = %self.ctx.last_update,
                    "Reached stale entry"
                );
                return Ok(RetentionDecision::SkippedStale);
            }
        }

        let link = draft.link.trim();
        if link.is_empty() {
            tracing::debug!(feed_id = self.ctx.feed_id, "Dropping entry without link");
            return Ok(RetentionDecision::SkippedNoChange(SkipReason::MissingLink));
        }

        let (description, images) = match draft.description.as_deref() {
            Some(body) => {
                let (text, images) = extract_images(body, &self.ctx.images_dir);
                (Some(text), images)
            }
            None => (None, Vec::new()),
        };

        let update = EntryUpdate {
            title: &title,
            description: description.as_deref(),
            date: draft.date,
        };
        if self
            .store
            .update_if_link_matches(self.ctx.feed_id, link, &update)
            .await?
        {
            return Ok(RetentionDecision::UpdatedExisting);
        }

        let entry_id = self
            .store
            .insert(
                self.ctx.feed_id,
                &NewEntry {
                    link,
                    title: &title,
                    description: description.as_deref(),
                    date: draft.date.unwrap_or_else(Utc::now),
                },
            )
            .await?;

        if self.ctx.fetch_images {
            self.cache_images(entry_id, &images).await;
        }

        Ok(RetentionDecision::Inserted { entry_id })
    }

    async fn cache_images(&self, entry_id: i64, images: &[ImageReference]) {
        for image in images {
            let path = image.local_path(&self.ctx.images_dir, entry_id);
            if !self.images.fetch_and_store(&image.url, &path).await {
                tracing::debug!(entry_id = entry_id, url = %image.url, "Entry image not cached");
            }
        }
    }
}
