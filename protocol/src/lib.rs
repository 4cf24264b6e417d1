//! Wire protocol for okcvm: Streaming Bus events, envelopes, tool results, and durable
//! history entries.
//!
//! This crate has no dependency on the agent runtime or workspace manager; it only defines
//! the shapes that cross the session/client boundary.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::{
    history_entry_id, truncate_for_stream, HistoryEntry, HistoryEntryBody, StreamEvent,
    ToolCompletionStatus, ToolResult, TOOL_PAYLOAD_SOFT_CAP,
};
