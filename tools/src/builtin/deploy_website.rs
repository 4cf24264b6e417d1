//! Deploy website tool: hands a workspace directory to the Deployment Store.

use async_trait::async_trait;
use okcvm_deploy::{DeployError, DeployRequest, Store};
use okcvm_protocol::ToolResult;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_DEPLOY_WEBSITE: &str = "mshtools-deploy_website";

pub struct DeployWebsiteTool {
    store: Store,
}

impl DeployWebsiteTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeployWebsiteTool {
    fn name(&self) -> &str {
        TOOL_DEPLOY_WEBSITE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_DEPLOY_WEBSITE.to_string(),
            description: Some(
                "Deploys a directory of static files from the workspace as a numbered, \
                 previewable site."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_dir": {"type": "string"},
                    "name": {"type": "string"},
                    "entry_file": {"type": "string"},
                    "force": {"type": "boolean"},
                    "start_server": {"type": "boolean"}
                },
                "required": ["source_dir"]
            }),
        }
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let source_dir = match args.get("source_dir").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::failure("'source_dir' is required"),
        };
        let source_path = match ctx.workspace.resolve(source_dir) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(e.to_string()),
        };

        let request = DeployRequest {
            source_dir: source_path,
            name: args.get("name").and_then(|v| v.as_str()).map(String::from),
            entry_file: args
                .get("entry_file")
                .and_then(|v| v.as_str())
                .map(String::from),
            force: args.get("force").and_then(|v| v.as_bool()).unwrap_or(false),
            start_server: args
                .get("start_server")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            session_id: ctx.workspace.token.clone(),
            existing_id: None,
        };

        match self.store.deploy(request).await {
            Ok(record) => {
                let summary = format!(
                    "Deployed '{}' to {} (id {})",
                    record.name, record.preview_url, record.id
                );
                ToolResult {
                    success: true,
                    output: Some(summary),
                    data: Some(serde_json::to_value(&record).unwrap_or(Value::Null)),
                    error: None,
                }
            }
            Err(e) => ToolResult::failure(deploy_error_message(&e)),
        }
    }
}

fn deploy_error_message(error: &DeployError) -> String {
    error.to_string()
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
    async fn deploys_a_directory_with_index_html() {
        let (dir, ctx) = ctx();
        std::fs::write(ctx.workspace.internal_mount.join("index.html"), "<html></html>")
            .unwrap();
        let deploy_store = Store::new(dir.path().join("deployments"));
        let tool = DeployWebsiteTool::new(deploy_store);

        let result = tool
            .call(
                json!({"source_dir": ctx.workspace.mount, "start_server": false}),
                &ctx,
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.output.unwrap().starts_with("Deployed"));
    }

    #[tokio::test]
    async fn missing_source_dir_argument_fails() {
        let (dir, ctx) = ctx();
        let deploy_store = Store::new(dir.path().join("deployments"));
        let tool = DeployWebsiteTool::new(deploy_store);
        let result = tool.call(json!({}), &ctx).await;
        assert!(!result.success);
    }
}
