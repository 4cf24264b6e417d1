//! Session State, Session Store, and the Streaming Bus: the orchestration layer that
//! ties the protocol/config/workspace/tools/deploy/agent crates together into one runnable,
//! multi-tenant session model for the HTTP surface.

pub mod bus;
pub mod session;
pub mod store;

pub use bus::{BusReceiver, StreamingBus, EVENT_QUEUE_CAPACITY};
pub use session::{
    format_size, SessionError, SessionState, UploadedFileRecord, BASE_SYSTEM_PROMPT,
    MAX_UPLOADS_PER_SESSION, MAX_UPLOAD_SIZE_BYTES, MAX_UPLOAD_SIZE_MB,
};
pub use store::{resolve_client_id, SessionStore, DEFAULT_CLIENT_ID};
