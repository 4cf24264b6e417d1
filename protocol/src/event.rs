//! Stream event protocol: the wire shape of one Streaming Bus event (type + payload), and the
//! shared Tool Result / History Entry shapes that flow between the Tool Registry, Agent
//! Runtime, and Session State.
//!
//! Uses a tagged-enum wire style (`#[serde(tag = "type", rename_all = "snake_case")]`) so each
//! event's JSON carries its own discriminant; the variant set is this system's own event
//! taxonomy, not a state-graph's.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Soft cap, in characters, applied to tool input/output before it is embedded in a
/// `tool_completed` event.
pub const TOOL_PAYLOAD_SOFT_CAP: usize = 320;

/// Truncates `s` to at most [`TOOL_PAYLOAD_SOFT_CAP`] characters, respecting char boundaries.
pub fn truncate_for_stream(s: &str) -> String {
    if s.chars().count() <= TOOL_PAYLOAD_SOFT_CAP {
        return s.to_string();
    }
    let mut out: String = s.chars().take(TOOL_PAYLOAD_SOFT_CAP).collect();
    out.push('\u{2026}');
    out
}

/// One event on the Streaming Bus. Envelope fields (session_id, event_id) are applied
/// separately by [`crate::envelope::EnvelopeState`]; this type carries only type + payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Model streaming a text chunk.
    Token { delta: String },
    /// A tool call was dispatched to the registry.
    ToolStarted {
        invocation_id: String,
        tool_name: Option<String>,
        input: Option<Value>,
    },
    /// A previously started tool call has finished, successfully or not.
    ToolCompleted {
        invocation_id: String,
        tool_name: Option<String>,
        status: ToolCompletionStatus,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Terminal: the same payload object the non-streaming path would return.
    #[serde(rename = "final")]
    Final { payload: Value },
    /// Terminal: the turn failed.
    Error { message: String },
    /// Sentinel. The iterator terminates after emitting it.
    Stop,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCompletionStatus {
    Success,
    Error,
}

impl StreamEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// True for the two variants that terminate a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Final { .. } | StreamEvent::Error { .. } | StreamEvent::Stop
        )
    }
}

/// Tool Result envelope: `{success, output?, data?, error?}`.
///
/// Invariant: if `success` is false, `error` is non-empty; if true, `data` is JSON-serialisable
/// (enforced by the constructors, not by the type itself — a plain struct keeps the wire shape
/// exactly as specified rather than introducing an enum the HTTP layer would have to flatten).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            data,
            error: None,
        }
    }

    pub fn ok_data(data: Value) -> Self {
        Self {
            success: true,
            output: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One entry in a session's ordered, append-only history: stable id
/// `<workspace-id>-<4-digit counter>`; never mutated in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(flatten)]
    pub body: HistoryEntryBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum HistoryEntryBody {
    User { content: String },
    Assistant { content: String },
    Tool {
        name: String,
        input: Value,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

/// Formats a history entry id as `<workspace_session_id>-<nnnn>`.
pub fn history_entry_id(workspace_session_id: &str, counter: u32) -> String {
    format!("{workspace_session_id}-{counter:04}")
}
