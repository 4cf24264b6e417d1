//! Agent Runtime: the Virtual Machine that owns a session's system prompt, Tool
//! Registry, and history, plus the `ChatEndpoint` collaborator it drives.

pub mod chat;
pub mod openai;
pub mod runtime;
pub mod stub;

pub use chat::{
    ChatEndpoint, ChatError, ChatMessage, ChatTurn, RequestedToolCall, TokenCallback, ToolEventSink,
};
pub use openai::ChatOpenAI;
pub use runtime::{ExecuteOutcome, ToolCallTrace, VirtualMachine, DEFAULT_MAX_TURNS};
pub use stub::StubChatEndpoint;
