//! Streaming RSS/RDF/Atom refresh engine.
//!
//! A refresh downloads a feed, streams it through a small state machine and
//! reconciles each entry against SQLite as soon as it is complete. Feeds list
//! newest entries first, so the first entry that is already known (or older
//! than the retention window) ends the parse.

pub mod config;
pub mod content;
pub mod feed;
pub mod storage;
pub mod util;
