//! Tool Registry: manifest loading and schema validation, name-keyed dispatch, and the
//! language-model-facing wrapper descriptions derived from each tool's spec.

use std::collections::HashMap;
use std::sync::Arc;

use okcvm_protocol::ToolResult;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::context::ToolContext;
use crate::error::RegistryError;
use crate::spec::{validate_schema, ToolSpec};
use crate::trait_def::{StubTool, Tool};

/// The description and argument shape an agent runtime uses to offer a tool to the model.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AgentToolWrapper {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A single manifest entry: a tool spec plus nothing else. The manifest itself is
/// `{ "functions": [ToolSpec, ...] }`.
#[derive(Debug, serde::Deserialize)]
struct Manifest {
    functions: Vec<ToolSpec>,
}

/// Reads and validates a manifest document. Does not register anything; callers pair this
/// with [`ToolRegistry::register`] or [`ToolRegistry::register_stub`] per entry.
pub fn load_manifest(document: &str) -> Result<Vec<ToolSpec>, RegistryError> {
    let manifest: Manifest = serde_json::from_str(document)
        .map_err(|e| RegistryError::Manifest(e.to_string()))?;
    for spec in &manifest.functions {
        if spec.name.trim().is_empty() {
            return Err(RegistryError::InvalidSpec {
                name: spec.name.clone(),
                reason: "empty name".to_string(),
            });
        }
        validate_schema(&spec.input_schema).map_err(|e| RegistryError::InvalidSpec {
            name: spec.name.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(manifest.functions)
}

struct Entry {
    tool: Box<dyn Tool>,
}

/// Name-keyed collection of tool implementations. Exactly one implementation is bound per
/// name; rebinding a name clears the cached agent wrapper for it.
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
    wrapper_cache: Option<Vec<AgentToolWrapper>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            wrapper_cache: None,
        }
    }

    /// Registers (or rebinds) a tool implementation by its own `name()`.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, Entry { tool });
        self.wrapper_cache = None;
    }

    /// Registers a fixed-failure stub for a manifest entry with no bound implementation.
    pub fn register_stub(&mut self, spec: ToolSpec) {
        self.register(Box::new(StubTool::new(spec)));
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|e| e.tool.spec()).collect()
    }

    /// Builds (or returns the cached) agent-facing wrapper list.
    pub fn agent_wrappers(&mut self) -> Vec<AgentToolWrapper> {
        if let Some(cached) = &self.wrapper_cache {
            return cached.clone();
        }
        let wrappers: Vec<AgentToolWrapper> = self
            .tools
            .values()
            .map(|e| {
                let spec = e.tool.spec();
                AgentToolWrapper {
                    name: spec.name,
                    description: spec.description.unwrap_or_default(),
                    input_schema: spec.input_schema,
                }
            })
            .collect();
        self.wrapper_cache = Some(wrappers.clone());
        wrappers
    }

    /// Dispatches a call by name. An unknown name produces a failed Tool Result rather than a
    /// Rust error — the registry never panics or propagates on agent-driven misuse.
    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        match self.tools.get(name) {
            Some(entry) => entry.tool.call(args, ctx).await,
            None => ToolResult::failure(format!("unknown tool: {name}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper around [`ToolRegistry`] shared across a session's concurrent tool calls.
pub struct ToolRegistryLocked {
    inner: Arc<RwLock<ToolRegistry>>,
}

impl ToolRegistryLocked {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ToolRegistry::new())),
        }
    }

    pub async fn register(&self, tool: Box<dyn Tool>) {
        self.inner.write().await.register(tool);
    }

    pub async fn register_stub(&self, spec: ToolSpec) {
        self.inner.write().await.register_stub(spec);
    }

    /// Registers from a non-async context, spawning a dedicated thread and single-thread
    /// runtime to take the write lock. Intended for constructors without an async context.
    pub fn register_sync(&self, tool: Box<dyn Tool>) {
        let registry = self.inner.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build registration runtime");
            rt.block_on(async move {
                registry.write().await.register(tool);
            });
        })
        .join()
        .expect("tool registration thread panicked");
    }

    pub async fn list(&self) -> Vec<ToolSpec> {
        self.inner.read().await.list()
    }

    pub async fn agent_wrappers(&self) -> Vec<AgentToolWrapper> {
        self.inner.write().await.agent_wrappers()
    }

    pub async fn call(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        self.inner.read().await.call(name, args, ctx).await
    }
}

impl Default for ToolRegistryLocked {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".to_string(),
                description: Some("echoes its input".to_string()),
                input_schema: json!({"type": "object"}),
            }
        }
        async fn call(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::ok_data(args)
        }
    }

    #[test]
    fn load_manifest_validates_each_entry() {
        let doc = json!({
            "functions": [
                {"name": "echo", "description": null, "input_schema": {"type": "object"}}
            ]
        })
        .to_string();
        let specs = load_manifest(&doc).unwrap();
        assert_eq!(specs.len(), 1);
    }

    #[test]
    fn load_manifest_rejects_bad_schema() {
        let doc = json!({
            "functions": [
                {"name": "echo", "description": null, "input_schema": {"type": "not-a-type"}}
            ]
        })
        .to_string();
        assert!(load_manifest(&doc).is_err());
    }

    #[test]
    fn register_clears_wrapper_cache() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let first = registry.agent_wrappers();
        assert_eq!(first.len(), 1);
        registry.register(Box::new(EchoTool));
        let second = registry.agent_wrappers();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn unregistered_spec_becomes_a_failing_stub() {
        let mut registry = ToolRegistry::new();
        registry.register_stub(ToolSpec {
            name: "not_built".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        });
        assert_eq!(registry.list().len(), 1);
    }
}
