//! The Agent Runtime's model-facing collaborator: the language model provider is treated as an
//! opaque external interface at the orchestration layer, but a runnable system needs a concrete
//! boundary rather than only a substrate. Shaped after a generic `LlmClient`-style trait: a
//! single async call carrying messages and tool definitions in, a turn (content plus any
//! requested tool calls) out.

use async_trait::async_trait;
use okcvm_tools::AgentToolWrapper;
use serde_json::Value;
use thiserror::Error;

/// One message in the conversation passed to the model. Tool results are folded back in as
/// assistant-visible text by the runtime before the next `invoke`.
#[derive(Clone, Debug)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant(String),
}

/// A tool invocation the model asked for as part of its turn.
#[derive(Clone, Debug)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The model's full turn: any final text plus zero or more requested tool calls.
#[derive(Clone, Debug, Default)]
pub struct ChatTurn {
    pub content: String,
    pub tool_calls: Vec<RequestedToolCall>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat endpoint request failed: {0}")]
    Request(String),
    #[error("chat endpoint returned no choices")]
    NoChoices,
}

/// Callback invoked with each streamed text delta.
pub type TokenCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Callback invoked around each tool dispatch within one `execute()` call, so a caller (the
/// Streaming Bus, via Session State) can emit `tool_started`/`tool_completed` events without the
/// Agent Runtime depending on the Streaming Bus directly.
pub trait ToolEventSink: Send + Sync {
    fn tool_started(&self, invocation_id: &str, tool_name: &str, input: &Value);

    #[allow(clippy::too_many_arguments)]
    fn tool_completed(
        &self,
        invocation_id: &str,
        tool_name: &str,
        success: bool,
        output: Option<&str>,
        error: Option<&str>,
        elapsed: std::time::Duration,
    );
}

/// The Agent Runtime's collaborator for talking to a language model.
#[async_trait]
pub trait ChatEndpoint: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[AgentToolWrapper],
    ) -> Result<ChatTurn, ChatError>;

    /// Streaming variant. The default falls back to [`invoke`](Self::invoke) without emitting
    /// any token callbacks, so an endpoint with no streaming support still behaves correctly.
    async fn invoke_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[AgentToolWrapper],
        _on_token: &TokenCallback<'_>,
    ) -> Result<ChatTurn, ChatError> {
        self.invoke(messages, tools).await
    }
}
