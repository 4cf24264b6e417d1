//! Shell tool: runs one command with an optional timeout and echoes combined output.

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::Duration;

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_SHELL: &str = "mshtools-shell";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_SHELL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SHELL.to_string(),
            description: Some(
                "Runs a shell command and returns combined stdout/stderr. Succeeds iff the \
                 command exits with status 0."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "The command to run."},
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (default 120000)."
                    }
                },
                "required": ["command"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::failure("missing 'command'"),
        };
        let timeout_ms = args
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        cmd.current_dir(&ctx.workspace.internal_root);

        let run = tokio::time::timeout(Duration::from_millis(timeout_ms), cmd.output()).await;
        let output = match run {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::failure(format!("failed to start command: {e}")),
            Err(_) => return ToolResult::failure(format!("command timed out after {timeout_ms}ms")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let combined = if stderr.is_empty() {
            stdout.clone()
        } else {
            format!("{stdout}\n{stderr}")
        };
        let success = output.status.success();

        ToolResult {
            success,
            output: Some(combined),
            data: Some(json!({
                "exit_code": output.status.code(),
                "stdout": stdout,
                "stderr": stderr,
            })),
            error: if success {
                None
            } else {
                Some(format!(
                    "command exited with status {}",
                    output.status.code().unwrap_or(-1)
                ))
            },
        }
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
    async fn echoes_stdout_on_success() {
        let (_dir, ctx) = ctx();
        let result = ShellTool.call(json!({"command": "echo hello"}), &ctx).await;
        assert!(result.success);
        assert!(result.output.unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let (_dir, ctx) = ctx();
        let result = ShellTool.call(json!({"command": "exit 3"}), &ctx).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn missing_command_is_rejected() {
        let (_dir, ctx) = ctx();
        let result = ShellTool.call(json!({}), &ctx).await;
        assert!(!result.success);
    }
}
