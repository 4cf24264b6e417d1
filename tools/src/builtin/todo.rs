//! Todo read/write tools: a list persisted for the lifetime of the process, scoped to
//! the calling session via [`ToolContext::state`].

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use serde_json::{json, Value};

use crate::context::{TodoItem, ToolContext};
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_TODO_READ: &str = "mshtools-todo_read";
pub const TOOL_TODO_WRITE: &str = "mshtools-todo_write";

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        TOOL_TODO_READ
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_TODO_READ.to_string(),
            description: Some("Reads the current todo list.".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: Value, ctx: &ToolContext) -> ToolResult {
        let todos = ctx.state.todos.lock().await;
        ToolResult::ok_data(json!({ "todos": &*todos }))
    }
}

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        TOOL_TODO_WRITE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_TODO_WRITE.to_string(),
            description: Some(
                "Writes the todo list. mode='replace' (default) overwrites the whole list, \
                 mode='append' adds to it, mode='clear' empties it."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "mode": {"type": "string", "enum": ["replace", "append", "clear"]},
                    "items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "content": {"type": "string"},
                                "status": {"type": "string"}
                            },
                            "required": ["content", "status"]
                        }
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let mode = args.get("mode").and_then(|v| v.as_str()).unwrap_or("replace");
        let mut todos = ctx.state.todos.lock().await;

        match mode {
            "clear" => {
                todos.clear();
            }
            "append" | "replace" => {
                let items: Vec<TodoItem> = match args.get("items") {
                    Some(v) => match serde_json::from_value(v.clone()) {
                        Ok(items) => items,
                        Err(e) => {
                            return ToolResult::failure(format!("invalid 'items': {e}"));
                        }
                    },
                    None => Vec::new(),
                };
                if mode == "replace" {
                    *todos = items;
                } else {
                    todos.extend(items);
                }
            }
            other => return ToolResult::failure(format!("unknown mode: {other}")),
        }

        ToolResult::ok_data(json!({ "todos": &*todos }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionToolState;
    use okcvm_workspace::{WorkspaceManager, WorkspaceManagerConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: dir.path().to_path_buf(),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        });
        let ws = manager.create_workspace().unwrap();
        (
            dir,
            ToolContext::new(Arc::new(ws), Arc::new(SessionToolState::default())),
        )
    }

    #[tokio::test]
    async fn replace_then_read_round_trips() {
        let (_dir, ctx) = ctx();
        let write = TodoWriteTool;
        let read = TodoReadTool;

        write
            .call(
                json!({"mode": "replace", "items": [{"content": "ship it", "status": "pending"}]}),
                &ctx,
            )
            .await;

        let result = read.call(json!({}), &ctx).await;
        assert!(result.success);
        let todos = result.data.unwrap()["todos"].as_array().unwrap().len();
        assert_eq!(todos, 1);
    }

    #[tokio::test]
    async fn append_adds_without_clearing() {
        let (_dir, ctx) = ctx();
        let write = TodoWriteTool;
        write
            .call(json!({"mode": "replace", "items": [{"content": "a", "status": "pending"}]}), &ctx)
            .await;
        write
            .call(json!({"mode": "append", "items": [{"content": "b", "status": "pending"}]}), &ctx)
            .await;
        let result = write.call(json!({"mode": "append", "items": []}), &ctx).await;
        assert_eq!(result.data.unwrap()["todos"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_empties_list() {
        let (_dir, ctx) = ctx();
        let write = TodoWriteTool;
        write
            .call(json!({"mode": "replace", "items": [{"content": "a", "status": "pending"}]}), &ctx)
            .await;
        let result = write.call(json!({"mode": "clear"}), &ctx).await;
        assert_eq!(result.data.unwrap()["todos"].as_array().unwrap().len(), 0);
    }
}
