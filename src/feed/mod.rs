//! Streaming feed parsing and refresh.
//!
//! - [`XmlEventSource`] turns raw bytes into a pull-based stream of [`FeedEvent`]s
//! - [`FeedHandler`] is the state machine that accumulates entries from those
//!   events and stops early once entries go stale
//! - [`Reconciler`] decides per entry whether to insert, update or drop it
//! - [`refresh_all`] / [`refresh_one`] download feeds and record refresh outcomes
//!
//! RSS 2.0, RDF/RSS 1.0 and Atom are handled by the same state machine;
//! only element names differ.

mod cancel;
mod context;
mod date;
mod draft;
mod events;
mod fetcher;
mod handler;
mod images;
mod reconcile;

pub use cancel::Cancellation;
pub use context::{FeedContext, ParseOutcome};
pub use date::{normalize_date, DateDialect};
pub use draft::{ActiveAccumulator, EntryDraft};
pub use events::{attribute, FeedEvent, XmlEventSource};
pub use fetcher::{refresh_all, refresh_one, FetchError, FetchResult, RefreshOptions};
pub use handler::{parse_feed, FeedHandler, ParseError, Phase};
pub use images::{extract_images, resolve_image_placeholders, ImageReference, ENTRY_ID_MARKER};
pub use reconcile::{Reconciler, RetentionDecision, SkipReason};
