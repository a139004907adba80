mod entries;
mod feeds;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::EntryStore;
pub use types::{DatabaseError, Entry, EntryUpdate, Feed, FeedMetadataUpdate, NewEntry};
