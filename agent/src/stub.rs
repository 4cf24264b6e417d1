//! Deterministic, scriptable `ChatEndpoint`: a fixed sequence of turns, one per think step,
//! with no network access. Lets a tool-calling scenario (e.g. a stub agent that invokes
//! `mshtools-deploy_website`) be expressed as a script instead of a real model call.

use std::collections::VecDeque;

use async_trait::async_trait;
use okcvm_tools::AgentToolWrapper;
use tokio::sync::Mutex;

use crate::chat::{ChatEndpoint, ChatError, ChatMessage, ChatTurn, RequestedToolCall, TokenCallback};

/// Replays a fixed script of turns, one per call to [`invoke`](ChatEndpoint::invoke); once the
/// script is exhausted, every further call returns a fixed final reply with no tool calls so the
/// agent loop always terminates.
pub struct StubChatEndpoint {
    scripted: Mutex<VecDeque<ChatTurn>>,
    default_reply: String,
}

impl StubChatEndpoint {
    pub fn new(scripted: impl IntoIterator<Item = ChatTurn>, default_reply: impl Into<String>) -> Self {
        Self {
            scripted: Mutex::new(scripted.into_iter().collect()),
            default_reply: default_reply.into(),
        }
    }

    /// A single-turn endpoint that always replies with fixed text and never calls a tool.
    pub fn fixed_reply(reply: impl Into<String>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default_reply: reply.into(),
        }
    }

    /// Scripts exactly one tool call followed by a final reply.
    pub fn single_tool_call(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        final_reply: impl Into<String>,
    ) -> Self {
        let turn = ChatTurn {
            content: String::new(),
            tool_calls: vec![RequestedToolCall {
                id: "call-1".to_string(),
                name: tool_name.into(),
                arguments,
            }],
        };
        Self::new([turn], final_reply)
    }
}

#[async_trait]
impl ChatEndpoint for StubChatEndpoint {
    async fn invoke(
        &self,
        _messages: &[ChatMessage],
        _tools: &[AgentToolWrapper],
    ) -> Result<ChatTurn, ChatError> {
        let mut scripted = self.scripted.lock().await;
        match scripted.pop_front() {
            Some(turn) => Ok(turn),
            None => Ok(ChatTurn {
                content: self.default_reply.clone(),
                tool_calls: Vec::new(),
            }),
        }
    }

    async fn invoke_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[AgentToolWrapper],
        on_token: &TokenCallback<'_>,
    ) -> Result<ChatTurn, ChatError> {
        let turn = self.invoke(messages, tools).await?;
        if !turn.content.is_empty() {
            on_token(&turn.content);
        }
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_scripted_turns_then_falls_back_to_default() {
        let endpoint = StubChatEndpoint::new(
            [ChatTurn {
                content: "first".to_string(),
                tool_calls: Vec::new(),
            }],
            "done",
        );
        let first = endpoint.invoke(&[], &[]).await.unwrap();
        assert_eq!(first.content, "first");
        let second = endpoint.invoke(&[], &[]).await.unwrap();
        assert_eq!(second.content, "done");
    }

    #[tokio::test]
    async fn single_tool_call_scripts_the_call_then_the_reply() {
        let endpoint = StubChatEndpoint::single_tool_call(
            "mshtools-deploy_website",
            serde_json::json!({"source_dir": "/mnt/okcomputer/site"}),
            "Deployed your site.",
        );
        let first = endpoint.invoke(&[], &[]).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.tool_calls[0].name, "mshtools-deploy_website");
        let second = endpoint.invoke(&[], &[]).await.unwrap();
        assert_eq!(second.content, "Deployed your site.");
        assert!(second.tool_calls.is_empty());
    }
}
