//! The `Tool` trait every built-in and stub tool implements.

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use serde_json::Value;

use crate::context::ToolContext;
use crate::spec::ToolSpec;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Whether this tool reads/writes through the injected Workspace Manager.
    fn requires_workspace(&self) -> bool {
        false
    }

    /// Runs the tool. Tools never propagate a Rust `Err` for ordinary failures — argument
    /// validation, missing resources, workspace violations, subprocess and external-service
    /// failures all surface as `ToolResult { success: false, error: Some(..) }`.
    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}

/// Registered in place of a real tool when a manifest entry has no implementation bound to it
///. Always fails with a fixed message.
pub struct StubTool {
    name: String,
    spec: ToolSpec,
}

impl StubTool {
    pub fn new(spec: ToolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            spec,
        }
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, _args: Value, _ctx: &ToolContext) -> ToolResult {
        ToolResult::failure(format!("'{}' is not implemented in this build", self.name))
    }
}
