//! The Agent Runtime / Virtual Machine: owns the system prompt, the Tool Registry, and ordered
//! history, and drives the think-act-observe loop behind `execute()`. Deliberately plain rather
//! than a compiled state graph: a state graph is the wrong shape for a single agent with an
//! unbounded, data-dependent tool loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use okcvm_protocol::event::{history_entry_id, HistoryEntry, HistoryEntryBody};
use okcvm_protocol::ToolResult;
use okcvm_tools::{ToolContext, ToolRegistryLocked};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::chat::{ChatEndpoint, ChatMessage, TokenCallback, ToolEventSink};

/// Default bound on tool-calling turns within one `execute()` call.
pub const DEFAULT_MAX_TURNS: u32 = 8;

/// One tool invocation made while producing a reply, returned alongside it so Session State
/// can walk it for previews and artifacts without re-parsing history.
#[derive(Clone, Debug)]
pub struct ToolCallTrace {
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_output: ToolResult,
}

/// The result of one `execute()` call.
#[derive(Clone, Debug)]
pub struct ExecuteOutcome {
    pub reply: String,
    pub tool_calls: Vec<ToolCallTrace>,
}

/// System prompt + Tool Registry + ordered history. One instance per Session State.
pub struct VirtualMachine {
    system_prompt: RwLock<String>,
    history: RwLock<Vec<HistoryEntry>>,
    counter: AtomicU32,
    workspace_session_id: String,
    registry: ToolRegistryLocked,
    chat_endpoint: std::sync::Arc<dyn ChatEndpoint>,
    max_turns: u32,
}

impl VirtualMachine {
    pub fn new(
        workspace_session_id: impl Into<String>,
        system_prompt: impl Into<String>,
        registry: ToolRegistryLocked,
        chat_endpoint: std::sync::Arc<dyn ChatEndpoint>,
    ) -> Self {
        Self {
            system_prompt: RwLock::new(system_prompt.into()),
            history: RwLock::new(Vec::new()),
            counter: AtomicU32::new(0),
            workspace_session_id: workspace_session_id.into(),
            registry,
            chat_endpoint,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub async fn update_system_prompt(&self, prompt: impl Into<String>) {
        *self.system_prompt.write().await = prompt.into();
    }

    /// Appends an already-built entry under a freshly allocated id, overwriting whatever id it
    /// carried.
    pub async fn record_history_entry(&self, body: HistoryEntryBody) -> HistoryEntry {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let entry = HistoryEntry {
            id: history_entry_id(&self.workspace_session_id, counter),
            body,
        };
        self.history.write().await.push(entry.clone());
        entry
    }

    pub async fn get_history_entry(&self, id: &str) -> Option<HistoryEntry> {
        self.history.read().await.iter().find(|e| e.id == id).cloned()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.read().await.clone()
    }

    /// Removes the trailing assistant/user pair if both exist, powering "regenerate".
    pub async fn discard_last_exchange(&self) {
        let mut history = self.history.write().await;
        if matches!(history.last().map(|e| &e.body), Some(HistoryEntryBody::Assistant { .. })) {
            history.pop();
        }
        if matches!(history.last().map(|e| &e.body), Some(HistoryEntryBody::User { .. })) {
            history.pop();
        }
    }

    /// Translates the permanent history into the user/assistant-only shape the model expects.
    async fn model_messages(&self) -> Vec<ChatMessage> {
        let system_prompt = self.system_prompt.read().await.clone();
        let mut messages = vec![ChatMessage::System(system_prompt)];
        for entry in self.history.read().await.iter() {
            match &entry.body {
                HistoryEntryBody::User { content } => messages.push(ChatMessage::User(content.clone())),
                HistoryEntryBody::Assistant { content } => {
                    messages.push(ChatMessage::Assistant(content.clone()))
                }
                HistoryEntryBody::Tool { .. } => {}
            }
        }
        messages
    }

    /// Runs one think-act-observe exchange.
    ///
    /// 1. Translate history into model messages, append `message`.
    /// 2. Invoke the model; while it asks for tool calls, dispatch them through the Tool
    ///    Registry, record each as a Tool history entry, and feed the observation back as the
    ///    next turn's input, bounded by `max_turns`.
    /// 3. On success, append the `user`/`assistant` pair to history under fresh ids and return
    ///    the reply plus every tool call made along the way.
    /// 4. On failure, return an error reply without mutating history.
    pub async fn execute(&self, message: &str, ctx: &ToolContext) -> ExecuteOutcome {
        self.execute_with(message, ctx, None, None).await
    }

    pub async fn execute_with(
        &self,
        message: &str,
        ctx: &ToolContext,
        on_token: Option<&TokenCallback<'_>>,
        on_tool_event: Option<&dyn ToolEventSink>,
    ) -> ExecuteOutcome {
        let mut messages = self.model_messages().await;
        messages.push(ChatMessage::User(message.to_string()));

        let tools = self.registry.agent_wrappers().await;
        let mut tool_calls = Vec::new();
        let reply;

        loop {
            let invocation = match on_token {
                Some(cb) => self.chat_endpoint.invoke_stream(&messages, &tools, cb).await,
                None => self.chat_endpoint.invoke(&messages, &tools).await,
            };
            let turn = match invocation {
                Ok(turn) => turn,
                Err(err) => {
                    return ExecuteOutcome {
                        reply: format!("An error occurred: {err}"),
                        tool_calls: Vec::new(),
                    };
                }
            };

            if turn.tool_calls.is_empty() {
                reply = turn.content;
                break;
            }

            if !turn.content.is_empty() {
                messages.push(ChatMessage::Assistant(turn.content.clone()));
            }

            for call in &turn.tool_calls {
                if let Some(sink) = on_tool_event {
                    sink.tool_started(&call.id, &call.name, &call.arguments);
                }
                let started = Instant::now();
                let result = self.registry.call(&call.name, call.arguments.clone(), ctx).await;
                if let Some(sink) = on_tool_event {
                    sink.tool_completed(
                        &call.id,
                        &call.name,
                        result.success,
                        result.output.as_deref(),
                        result.error.as_deref(),
                        started.elapsed(),
                    );
                }
                self.record_history_entry(HistoryEntryBody::Tool {
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                    success: result.success,
                    output: result.output.clone(),
                    data: result.data.clone(),
                })
                .await;

                let observation = format!(
                    "Tool {} {}: {}",
                    call.name,
                    if result.success { "succeeded" } else { "failed" },
                    result
                        .output
                        .clone()
                        .or_else(|| result.error.clone())
                        .unwrap_or_default()
                );
                messages.push(ChatMessage::Assistant(observation));

                tool_calls.push(ToolCallTrace {
                    tool_name: call.name.clone(),
                    tool_input: call.arguments.clone(),
                    tool_output: result,
                });
            }

            if tool_calls.len() as u32 >= self.max_turns {
                reply = "I wasn't able to finish within the allotted number of tool calls."
                    .to_string();
                break;
            }
        }

        self.record_history_entry(HistoryEntryBody::User {
            content: message.to_string(),
        })
        .await;
        self.record_history_entry(HistoryEntryBody::Assistant {
            content: reply.clone(),
        })
        .await;

        ExecuteOutcome { reply, tool_calls }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubChatEndpoint;
    use okcvm_tools::bootstrap::register_default_tools;
    use okcvm_tools::SessionToolState;
    use okcvm_workspace::{WorkspaceManager, WorkspaceManagerConfig};
    use std::sync::Arc;

    fn fixture() -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: dir.path().to_path_buf(),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        });
        let workspace = manager.create_workspace().unwrap();
        let ctx = ToolContext::new(Arc::new(workspace), Arc::new(SessionToolState::default()));
        (dir, ctx)
    }

    #[tokio::test]
    async fn plain_reply_records_user_and_assistant_entries() {
        let (_dir, ctx) = fixture();
        let endpoint = std::sync::Arc::new(StubChatEndpoint::fixed_reply("Hi there."));
        let vm = VirtualMachine::new("ws-test", "you are helpful", ToolRegistryLocked::new(), endpoint);

        let outcome = vm.execute("hello", &ctx).await;
        assert_eq!(outcome.reply, "Hi there.");
        assert!(outcome.tool_calls.is_empty());

        let history = vm.history().await;
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0].body, HistoryEntryBody::User { .. }));
        assert!(matches!(history[1].body, HistoryEntryBody::Assistant { .. }));
        assert!(history[0].id.starts_with("ws-test-"));
    }

    #[tokio::test]
    async fn tool_call_turn_records_a_tool_entry_and_returns_its_trace() {
        let (_dir, ctx) = fixture();
        let registry = ToolRegistryLocked::new();
        register_default_tools(&registry, &okcvm_deploy::Store::new(ctx.workspace.internal_root.clone()))
            .await
            .unwrap();

        let endpoint = std::sync::Arc::new(StubChatEndpoint::single_tool_call(
            "mshtools-todo_write",
            serde_json::json!({"items": [{"content": "write report", "status": "pending"}]}),
            "Added that to your todo list.",
        ));
        let vm = VirtualMachine::new("ws-test", "you are helpful", registry, endpoint);

        let outcome = vm.execute("track this for me", &ctx).await;
        assert_eq!(outcome.reply, "Added that to your todo list.");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].tool_name, "mshtools-todo_write");
        assert!(outcome.tool_calls[0].tool_output.success);

        let history = vm.history().await;
        let tool_entries: Vec<_> = history
            .iter()
            .filter(|e| matches!(e.body, HistoryEntryBody::Tool { .. }))
            .collect();
        assert_eq!(tool_entries.len(), 1);
    }

    #[tokio::test]
    async fn discard_last_exchange_removes_the_trailing_pair() {
        let (_dir, ctx) = fixture();
        let endpoint = std::sync::Arc::new(StubChatEndpoint::fixed_reply("ok"));
        let vm = VirtualMachine::new("ws-test", "prompt", ToolRegistryLocked::new(), endpoint);
        vm.execute("first", &ctx).await;
        assert_eq!(vm.history().await.len(), 2);
        vm.discard_last_exchange().await;
        assert!(vm.history().await.is_empty());
    }

    #[tokio::test]
    async fn chat_endpoint_failure_leaves_history_untouched() {
        let (_dir, ctx) = fixture();
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl ChatEndpoint for AlwaysFails {
            async fn invoke(
                &self,
                _messages: &[ChatMessage],
                _tools: &[okcvm_tools::AgentToolWrapper],
            ) -> Result<crate::chat::ChatTurn, crate::chat::ChatError> {
                Err(crate::chat::ChatError::NoChoices)
            }
        }
        let vm = VirtualMachine::new("ws-test", "prompt", ToolRegistryLocked::new(), std::sync::Arc::new(AlwaysFails));
        let outcome = vm.execute("hello", &ctx).await;
        assert!(outcome.reply.starts_with("An error occurred"));
        assert!(vm.history().await.is_empty());
    }
}
