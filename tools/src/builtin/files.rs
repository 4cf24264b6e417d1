//! File read/write/edit tools: absolute paths only, resolved through the workspace.

use async_trait::async_trait;
use base64::Engine;
use okcvm_protocol::ToolResult;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_FILES_READ: &str = "mshtools-files_read";
pub const TOOL_FILES_WRITE: &str = "mshtools-files_write";
pub const TOOL_FILES_EDIT: &str = "mshtools-files_edit";

fn require_absolute(args: &Value) -> Result<&str, ToolResult> {
    let file_path = args
        .get("file_path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::failure("'file_path' is required"))?;
    if !file_path.starts_with('/') {
        return Err(ToolResult::failure("'file_path' must be absolute"));
    }
    Ok(file_path)
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_FILES_READ
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_FILES_READ.to_string(),
            description: Some(
                "Reads a file. Returns a base64 data-URL for image MIME types, otherwise the \
                 text content, optionally sliced by line offset/limit."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"}
                },
                "required": ["file_path"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let file_path = match require_absolute(&args) {
            Ok(p) => p,
            Err(result) => return result,
        };
        let path = match ctx.workspace.resolve(file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e.to_string()),
        };
        if !path.exists() {
            return ToolResult::failure(format!("File not found: {}", path.display()));
        }

        let mime = mime_guess::from_path(&path).first();
        if let Some(mime) = &mime {
            if mime.type_() == mime::IMAGE {
                let bytes = match std::fs::read(&path) {
                    Ok(b) => b,
                    Err(e) => return ToolResult::failure(e.to_string()),
                };
                let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                let output = format!("data:{mime};base64,{data}");
                return ToolResult {
                    success: true,
                    output: Some(output),
                    data: Some(json!({"mime": mime.to_string(), "base64": data})),
                    error: None,
                };
            }
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return ToolResult::failure(format!("failed to read file: {e}")),
        };

        let offset = args.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);
        let lines: Vec<&str> = content.lines().collect();
        let end = match limit {
            Some(limit) => (offset + limit).min(lines.len()),
            None => lines.len(),
        };
        let text = if offset >= lines.len() {
            String::new()
        } else {
            let mut sliced = lines[offset..end].join("\n");
            if end == lines.len() && content.ends_with('\n') {
                sliced.push('\n');
            }
            sliced
        };

        ToolResult {
            success: true,
            output: Some(text.clone()),
            data: Some(Value::String(text)),
            error: None,
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        TOOL_FILES_WRITE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_FILES_WRITE.to_string(),
            description: Some(
                "Writes (or appends to) a file, creating parent directories as needed."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "content": {"type": "string"},
                    "append": {"type": "boolean"}
                },
                "required": ["file_path", "content"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let file_path = match require_absolute(&args) {
            Ok(p) => p,
            Err(result) => return result,
        };
        let content = match args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::failure("'content' is required"),
        };
        let append = args.get("append").and_then(|v| v.as_bool()).unwrap_or(false);

        let path = match ctx.workspace.resolve(file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e.to_string()),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::failure(format!("failed to create parent directory: {e}"));
            }
        }

        let result = if append {
            use std::io::Write;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut f| f.write_all(content.as_bytes()))
        } else {
            std::fs::write(&path, content)
        };
        if let Err(e) = result {
            return ToolResult::failure(format!("failed to write file: {e}"));
        }

        let path_str = path.display().to_string();
        ToolResult {
            success: true,
            output: Some(format!("Wrote file {path_str}")),
            data: Some(json!({"path": path_str})),
            error: None,
        }
    }
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        TOOL_FILES_EDIT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_FILES_EDIT.to_string(),
            description: Some(
                "Replaces a unique substring in a file (or all occurrences when replace_all); \
                 fails if the target text is ambiguous or absent."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"},
                    "replace_all": {"type": "boolean"}
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let file_path = match require_absolute(&args) {
            Ok(p) => p,
            Err(result) => return result,
        };
        let old = match args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::failure("'old_string' is required"),
        };
        let new = match args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::failure("'new_string' is required"),
        };
        if old == new {
            return ToolResult::failure("'old_string' and 'new_string' must differ");
        }
        let replace_all = args.get("replace_all").and_then(|v| v.as_bool()).unwrap_or(false);

        let path = match ctx.workspace.resolve(file_path) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e.to_string()),
        };
        if !path.exists() {
            return ToolResult::failure(format!("File not found: {}", path.display()));
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => return ToolResult::failure(format!("failed to read file: {e}")),
        };

        let count = text.matches(old).count();
        if count == 0 {
            return ToolResult::failure("'old_string' not found in file");
        }
        if count > 1 && !replace_all {
            return ToolResult::failure(
                "'old_string' is not unique; pass replace_all=true to replace all occurrences",
            );
        }

        let (updated, replacements) = if replace_all {
            (text.replace(old, new), count)
        } else {
            (text.replacen(old, new, 1), 1)
        };

        if let Err(e) = std::fs::write(&path, &updated) {
            return ToolResult::failure(format!("failed to write file: {e}"));
        }

        let path_str = path.display().to_string();
        ToolResult {
            success: true,
            output: Some(path_str.clone()),
            data: Some(json!({"replacements": replacements, "path": path_str})),
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
    async fn write_then_read_round_trips() {
        let (_dir, ctx) = ctx();
        let write = WriteFileTool;
        let read = ReadFileTool;
        let path = format!("{}notes.txt", ctx.workspace.mount);

        let w = write
            .call(json!({"file_path": path, "content": "hello\nworld\n"}), &ctx)
            .await;
        assert!(w.success);
        assert!(w.output.unwrap().starts_with("Wrote file"));

        let r = read.call(json!({"file_path": path}), &ctx).await;
        assert!(r.success);
        assert_eq!(r.output.unwrap(), "hello\nworld\n");
    }

    #[tokio::test]
    async fn read_respects_offset_and_limit() {
        let (_dir, ctx) = ctx();
        let write = WriteFileTool;
        let read = ReadFileTool;
        let path = format!("{}notes.txt", ctx.workspace.mount);
        write
            .call(json!({"file_path": path, "content": "a\nb\nc\n"}), &ctx)
            .await;
        let r = read
            .call(json!({"file_path": path, "offset": 1, "limit": 1}), &ctx)
            .await;
        assert_eq!(r.output.unwrap(), "b");
    }

    #[tokio::test]
    async fn relative_path_is_rejected() {
        let (_dir, ctx) = ctx();
        let read = ReadFileTool;
        let r = read.call(json!({"file_path": "notes.txt"}), &ctx).await;
        assert!(!r.success);
    }

    #[tokio::test]
    async fn edit_fails_on_ambiguous_match() {
        let (_dir, ctx) = ctx();
        let write = WriteFileTool;
        let edit = EditFileTool;
        let path = format!("{}notes.txt", ctx.workspace.mount);
        write
            .call(json!({"file_path": path, "content": "aa aa"}), &ctx)
            .await;
        let r = edit
            .call(
                json!({"file_path": path, "old_string": "aa", "new_string": "bb"}),
                &ctx,
            )
            .await;
        assert!(!r.success);

        let r = edit
            .call(
                json!({
                    "file_path": path,
                    "old_string": "aa",
                    "new_string": "bb",
                    "replace_all": true
                }),
                &ctx,
            )
            .await;
        assert!(r.success);
        assert_eq!(r.data.unwrap()["replacements"], 2);
    }

    #[tokio::test]
    async fn edit_rejects_identical_strings() {
        let (_dir, ctx) = ctx();
        let edit = EditFileTool;
        let path = format!("{}notes.txt", ctx.workspace.mount);
        let r = edit
            .call(
                json!({"file_path": path, "old_string": "same", "new_string": "same"}),
                &ctx,
            )
            .await;
        assert!(!r.success);
    }
}
