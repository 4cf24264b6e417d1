//! Durable Conversation Store: a per-client-id index over an opaque JSON conversation
//! graph, with side columns cached from that graph's `workspace` object for fast listing and
//! for workspace/deployment cleanup on delete.
//!
//! Storage shape is adapted from the workspace/thread SQLite store this crate's author has
//! shipped elsewhere: a single `Arc<Mutex<rusqlite::Connection>>` behind an async facade, with
//! blocking calls pushed onto the blocking pool via `tokio::task::block_in_place` since rusqlite
//! has no async driver.

mod store;

pub use store::{ConversationRecord, ConversationSummary, DeleteOutcome, Store, StoreError};
