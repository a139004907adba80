use chrono::{Duration, Utc};
use std::io::BufRead;
use thiserror::Error;

use super::cancel::Cancellation;
use super::context::{FeedContext, ParseOutcome};
use super::date::DateDialect;
use super::draft::{ActiveAccumulator, EntryDraft};
use super::events::{attribute, FeedEvent, XmlEventSource};
use super::reconcile::{Reconciler, RetentionDecision};
use crate::content::ImageFetch;
use crate::storage::{DatabaseError, EntryStore, FeedMetadataUpdate};

/// Subtracted from "now" when stamping a refresh, so an entry published in
/// the same second as the refresh is not treated as stale next time.
const REFRESH_BACKOFF_SECS: i64 = 1;

/// Errors that abort a feed parse.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// The entry store rejected a read or write.
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Where the state machine is in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the root element.
    Idle,
    /// Inside the root, between entries.
    InFeed,
    InEntry,
    /// Root closed or parse stopped; further events are ignored.
    Done,
}

fn is_feed_root(name: &str) -> bool {
    matches!(name, "rss" | "rdf" | "RDF" | "feed")
}

fn is_entry(name: &str) -> bool {
    matches!(name, "item" | "entry")
}

fn is_body_text(name: &str) -> bool {
    matches!(name, "description" | "summary" | "content")
}

/// Streaming state machine for RSS 2.0, RDF/RSS 1.0 and Atom documents.
///
/// Consumes one [`FeedEvent`] at a time, accumulates each entry into an
/// [`EntryDraft`], and hands completed drafts to the [`Reconciler`].
pub struct FeedHandler<'a, S, I> {
    ctx: &'a FeedContext,
    store: &'a S,
    reconciler: Reconciler<'a, S, I>,
    cancel: Cancellation,
    phase: Phase,
    active: ActiveAccumulator,
    /// Feed title text, collected only before the first entry.
    feed_title: Option<String>,
    draft: Option<EntryDraft>,
    feed_refreshed: bool,
    new_count: usize,
}

impl<'a, S: EntryStore, I: ImageFetch> FeedHandler<'a, S, I> {
    pub fn new(ctx: &'a FeedContext, store: &'a S, images: &'a I, cancel: Cancellation) -> Self {
        Self {
            ctx,
            store,
            reconciler: Reconciler::new(ctx, store, images),
            cancel,
            phase: Phase::Idle,
            active: ActiveAccumulator::None,
            feed_title: None,
            draft: None,
            feed_refreshed: false,
            new_count: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn outcome(&self) -> ParseOutcome {
        ParseOutcome {
            new_count: self.new_count,
            done: self.phase == Phase::Done,
        }
    }

    /// Drives the handler over `events` until they run out or the parse
    /// is stopped.
    pub async fn run<E>(mut self, mut events: E) -> Result<ParseOutcome, ParseError>
    where
        E: Iterator<Item = Result<FeedEvent, ParseError>>,
    {
        while !self.cancel.is_stopped() {
            let Some(event) = events.next() else {
                break;
            };
            self.handle(event?).await?;
        }
        Ok(self.outcome())
    }

    /// Applies one event.
    pub async fn handle(&mut self, event: FeedEvent) -> Result<(), ParseError> {
        if self.phase == Phase::Done {
            return Ok(());
        }

        match event {
            FeedEvent::Open { name, attributes } => self.open(&name, &attributes).await,
            FeedEvent::Text(text) => {
                self.text(&text);
                Ok(())
            }
            FeedEvent::Close { name } => self.close(&name).await,
        }
    }

    async fn open(&mut self, name: &str, attributes: &[(String, String)]) -> Result<(), ParseError> {
        if is_feed_root(name) {
            if self.phase == Phase::Idle {
                self.phase = Phase::InFeed;
            }
            return Ok(());
        }

        if is_entry(name) {
            return self.begin_entry().await;
        }

        match (&mut self.draft, name) {
            (Some(draft), "title") => {
                if draft.begin_title() {
                    self.active = ActiveAccumulator::Title;
                }
            }
            (None, "title") => {
                if !self.feed_refreshed && self.feed_title.is_none() {
                    self.feed_title = Some(String::new());
                    self.active = ActiveAccumulator::Title;
                }
            }
            (Some(draft), "link") => {
                self.active =
                    draft.begin_link(attribute(attributes, "href"), attribute(attributes, "rel"));
            }
            (Some(draft), name) if is_body_text(name) => {
                draft.begin_description();
                self.active = ActiveAccumulator::Description;
            }
            (Some(draft), name) => {
                if let Some(dialect) = DateDialect::from_tag(name) {
                    draft.begin_date();
                    self.active = ActiveAccumulator::Date(dialect);
                }
            }
            (None, _) => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        match (&mut self.draft, self.active) {
            (_, ActiveAccumulator::None) => {}
            (Some(draft), target) => draft.push_text(target, text),
            (None, ActiveAccumulator::Title) => {
                if let Some(title) = self.feed_title.as_mut() {
                    title.push_str(text);
                }
            }
            (None, _) => {}
        }
    }

    async fn close(&mut self, name: &str) -> Result<(), ParseError> {
        if is_feed_root(name) {
            tracing::debug!(feed_id = self.ctx.feed_id, "Feed document complete");
            self.stop();
            return Ok(());
        }

        if is_entry(name) {
            return self.finish_entry().await;
        }

        match (self.active, name) {
            (ActiveAccumulator::Title, "title") | (ActiveAccumulator::Link, "link") => {
                self.active = ActiveAccumulator::None;
            }
            (ActiveAccumulator::Description, name) if is_body_text(name) => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.finish_description();
                }
                self.active = ActiveAccumulator::None;
            }
            (ActiveAccumulator::Date(dialect), name) if DateDialect::from_tag(name).is_some() => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.finish_date(dialect);
                }
                self.active = ActiveAccumulator::None;
            }
            _ => {}
        }
        Ok(())
    }

    async fn begin_entry(&mut self) -> Result<(), ParseError> {
        if !self.feed_refreshed {
            self.refresh_feed_metadata().await?;
        }
        if self.draft.is_some() {
            tracing::debug!(feed_id = self.ctx.feed_id, "Entry opened inside an unfinished entry; discarding it");
        }
        self.draft = Some(EntryDraft::new());
        self.active = ActiveAccumulator::None;
        self.phase = Phase::InEntry;
        Ok(())
    }

    async fn finish_entry(&mut self) -> Result<(), ParseError> {
        self.active = ActiveAccumulator::None;
        let Some(draft) = self.draft.take() else {
            return Ok(());
        };
        self.phase = Phase::InFeed;

        let decision = self.reconciler.reconcile(draft).await?;
        tracing::trace!(feed_id = self.ctx.feed_id, ?decision, "Entry reconciled");
        match decision {
            RetentionDecision::Inserted { .. } => self.new_count += 1,
            RetentionDecision::SkippedStale => self.stop(),
            RetentionDecision::UpdatedExisting | RetentionDecision::SkippedNoChange(_) => {}
        }
        Ok(())
    }

    /// Refreshes the feed row once, just before the first entry.
    async fn refresh_feed_metadata(&mut self) -> Result<(), ParseError> {
        let feed_title = self.feed_title.take();
        let title = match self.ctx.title {
            Some(_) => None,
            None => feed_title
                .map(|title| title.trim().to_string())
                .filter(|title| !title.is_empty()),
        };

        self.store
            .update_feed_metadata(
                self.ctx.feed_id,
                &FeedMetadataUpdate {
                    title,
                    last_update: Utc::now() - Duration::seconds(REFRESH_BACKOFF_SECS),
                },
            )
            .await?;
        self.feed_refreshed = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.phase = Phase::Done;
        self.active = ActiveAccumulator::None;
        self.draft = None;
        self.cancel.request_stop();
    }
}

/// Parses one feed document and reconciles its entries with `store`.
///
/// Entries of the feed dated before the retention cutoff are deleted first
/// (favorites excepted). Parsing then stops early at the first stale entry.
///
/// # Errors
///
/// Returns [`ParseError::Xml`] for malformed documents and
/// [`ParseError::Store`] when the store fails. Entries reconciled before the
/// error stay stored.
pub async fn parse_feed<R, S, I>(
    input: R,
    ctx: &FeedContext,
    store: &S,
    images: &I,
) -> Result<ParseOutcome, ParseError>
where
    R: BufRead,
    S: EntryStore,
    I: ImageFetch,
{
    let removed = store
        .delete_older_than(ctx.feed_id, ctx.retention_cutoff, true)
        .await?;
    if removed > 0 {
        tracing::debug!(feed_id = ctx.feed_id, removed = removed, "Removed entries outside retention window");
    }

    let cancel = Cancellation::new();
    let events = XmlEventSource::new(input, cancel.clone());
    let outcome = FeedHandler::new(ctx, store, images, cancel)
        .run(events)
        .await?;

    tracing::debug!(
        feed_id = ctx.feed_id,
        new_entries = outcome.new_count,
        done = outcome.done,
        "Feed parsed"
    );
    Ok(outcome)
}
