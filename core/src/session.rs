//! Session State: the integrator. Owns one client's Workspace, Tool Registry, and Agent
//! Runtime; tracks uploads; extracts structured preview data out of tool results, generalised
//! to a richer artifact contract than a bare `html`/`slides` key.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use okcvm_agent::{ChatEndpoint, ExecuteOutcome, TokenCallback, ToolCallTrace, ToolEventSink, VirtualMachine};
use okcvm_config::Configuration;
use okcvm_deploy::Store as DeployStore;
use okcvm_protocol::event::{HistoryEntry, HistoryEntryBody};
use okcvm_tools::{bootstrap::register_default_tools, RegistryError, SessionToolState, ToolContext, ToolRegistryLocked};
use okcvm_workspace::{HeadDescription, SnapshotInfo, Workspace, WorkspaceError, WorkspaceManager};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::bus::StreamingBus;

/// Base system prompt, adapted per-workspace via [`Workspace::adapt_prompt`] and, once a
/// session has uploads, extended with a trailing file listing.
pub const BASE_SYSTEM_PROMPT: &str = include_str!("../../spec/system_prompt.md");

const WELCOME_MESSAGE: &str =
    "你好，我是 OK Computer。告诉我你的想法，我可以同步生成网页与 PPT 预览。";

const STUDIO_HTML: &str = include_str!("studio_preview.html");

/// Upload limits surfaced in the boot payload.
pub const MAX_UPLOADS_PER_SESSION: usize = 100;
pub const MAX_UPLOAD_SIZE_MB: u64 = 100;
pub const MAX_UPLOAD_SIZE_BYTES: u64 = MAX_UPLOAD_SIZE_MB * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("tool registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// One recorded upload, keyed by `name` for replace-on-reupload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadedFileRecord {
    pub name: String,
    pub relative_path: String,
    pub size_bytes: u64,
}

/// Renders a byte count as a human-readable size, used in the uploaded-files system prompt
/// section.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} {}", UNITS[0]);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

struct Inner {
    workspace: Arc<Workspace>,
    tool_state: Arc<SessionToolState>,
    vm: VirtualMachine,
    uploads: Vec<UploadedFileRecord>,
    booted: bool,
}

/// Composes a freshly built Workspace, Tool Registry, and Agent Runtime for one client.
pub struct SessionState {
    pub client_id: String,
    config: Configuration,
    workspace_manager: Arc<WorkspaceManager>,
    deploy_store: DeployStore,
    chat_endpoint: Arc<dyn ChatEndpoint>,
    inner: Mutex<Inner>,
}

async fn build(
    workspace_manager: &WorkspaceManager,
    deploy_store: &DeployStore,
    chat_endpoint: Arc<dyn ChatEndpoint>,
) -> Result<(Arc<Workspace>, Arc<SessionToolState>, VirtualMachine), SessionError> {
    let workspace = Arc::new(workspace_manager.create_workspace()?);
    let tool_state = Arc::new(SessionToolState::default());
    let registry = ToolRegistryLocked::new();
    register_default_tools(&registry, deploy_store).await?;
    let system_prompt = workspace.adapt_prompt(BASE_SYSTEM_PROMPT);
    let vm = VirtualMachine::new(workspace.token.clone(), system_prompt, registry, chat_endpoint);
    Ok((workspace, tool_state, vm))
}

impl SessionState {
    /// Builds a fresh session: a new Workspace, a fully-registered Tool Registry, and an Agent
    /// Runtime wired to `chat_endpoint`.
    pub async fn new(
        client_id: impl Into<String>,
        config: Configuration,
        workspace_manager: Arc<WorkspaceManager>,
        deploy_store: DeployStore,
        chat_endpoint: Arc<dyn ChatEndpoint>,
    ) -> Result<Self, SessionError> {
        let (workspace, tool_state, vm) =
            build(&workspace_manager, &deploy_store, chat_endpoint.clone()).await?;
        Ok(Self {
            client_id: client_id.into(),
            config,
            workspace_manager,
            deploy_store,
            chat_endpoint,
            inner: Mutex::new(Inner {
                workspace,
                tool_state,
                vm,
                uploads: Vec::new(),
                booted: false,
            }),
        })
    }

    /// Runs one chat exchange. Serialised per session: the lock held across the whole call is
    /// what guarantees at most one `respond()` executes at a time per client. When `bus` is
    /// given, token deltas and tool lifecycle events are forwarded to it as they happen and the
    /// final payload is published as the terminal `final` event followed by `stop`; otherwise
    /// the same payload is simply returned.
    pub async fn respond(&self, message: &str, replace_last: bool, bus: Option<&StreamingBus>) -> Value {
        let mut inner = self.inner.lock().await;

        if replace_last {
            inner.vm.discard_last_exchange().await;
        }

        let ctx = ToolContext::new(inner.workspace.clone(), inner.tool_state.clone());

        let token_cb = bus.map(|b| move |delta: &str| b.token(delta));
        let on_token: Option<&TokenCallback<'_>> = token_cb.as_ref().map(|f| f as &TokenCallback<'_>);
        let sink = bus.map(BusToolSink::new);
        let on_tool_event: Option<&dyn ToolEventSink> = sink.as_ref().map(|s| s as &dyn ToolEventSink);

        let outcome: ExecuteOutcome = inner.vm.execute_with(message, &ctx, on_token, on_tool_event).await;

        let extracted = extract_preview(&outcome.tool_calls);
        let preview_base = self.config.workspace_config().preview_base_url;
        let web_preview = extracted
            .preview
            .map(|raw| normalize_preview(raw, preview_base.as_deref(), &self.client_id));

        let label = format!("After: {}", truncate_chars(message, 60));
        let commit_id = inner.workspace.snapshot(Some(&label)).unwrap_or_else(|err| {
            tracing::warn!("workspace snapshot failed: {err}");
            None
        });

        let model = self
            .config
            .chat_config()
            .model
            .unwrap_or_else(|| "Unconfigured chat model".to_string());

        let history = inner.vm.history().await;
        let vm_history: Vec<&HistoryEntry> = history.iter().rev().take(25).collect::<Vec<_>>();
        let vm_history: Vec<&HistoryEntry> = vm_history.into_iter().rev().collect();

        let tool_calls_json: Vec<Value> = outcome
            .tool_calls
            .iter()
            .map(|t| {
                json!({
                    "tool_name": t.tool_name,
                    "tool_input": t.tool_input,
                    "tool_output": t.tool_output,
                })
            })
            .collect();

        let payload = json!({
            "reply": outcome.reply,
            "meta": {
                "model": model,
                "timestamp": Utc::now().to_rfc3339(),
                "summary": extracted.summary.unwrap_or_default(),
            },
            "web_preview": web_preview,
            "ppt_slides": extracted.slides,
            "artifacts": extracted.artifacts,
            "tool_calls": tool_calls_json,
            "vm_history": vm_history,
            "workspace_state": {"commit_id": commit_id},
            "uploads": inner.uploads,
        });

        if let Some(bus) = bus {
            bus.final_event(payload.clone());
            bus.close();
        }

        payload
    }

    /// Idempotent across repeat calls — the first assistant message, once recorded, is what
    /// every later call returns.
    pub async fn boot(&self) -> Value {
        let mut inner = self.inner.lock().await;
        if !inner.booted {
            inner
                .vm
                .record_history_entry(HistoryEntryBody::Assistant {
                    content: WELCOME_MESSAGE.to_string(),
                })
                .await;
            inner.booted = true;
        }

        let history = inner.vm.history().await;
        let first_reply = history
            .iter()
            .find_map(|e| match &e.body {
                HistoryEntryBody::Assistant { content } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_else(|| WELCOME_MESSAGE.to_string());

        json!({
            "reply": first_reply,
            "meta": {
                "model": "OKC-Orchestrator",
                "timestamp": Utc::now().to_rfc3339(),
                "summary": "Workbench Initialized",
            },
            "web_preview": {"html": STUDIO_HTML},
            "ppt_slides": [
                {"title": "灵感孵化室能力", "bullets": ["网页 / PPT 一体生成", "模型调用透明可追踪", "可视化实时预览"]},
                {"title": "示例需求", "bullets": ["品牌落地页", "产品发布会演示", "活动招募物料"]},
            ],
            "vm": {
                "history_length": history.len(),
                "workspace_token": inner.workspace.token,
            },
            "upload_limit": MAX_UPLOADS_PER_SESSION,
            "max_upload_size_mb": MAX_UPLOAD_SIZE_MB,
            "max_upload_size_bytes": MAX_UPLOAD_SIZE_BYTES,
        })
    }

    /// Removes the workspace and every deployment tagged with its session id, then rebuilds
    /// with a fresh workspace token (a full reset, not a history-array clear in place).
    pub async fn delete_history(&self) -> Value {
        let mut inner = self.inner.lock().await;
        let history_length = inner.vm.history().await.len();
        let old_token = inner.workspace.token.clone();
        let removed = inner.workspace.cleanup().unwrap_or(false);
        let deployments = self.deploy_store.cleanup_session(&old_token);

        match build(&self.workspace_manager, &self.deploy_store, self.chat_endpoint.clone()).await {
            Ok((workspace, tool_state, vm)) => {
                inner.workspace = workspace;
                inner.tool_state = tool_state;
                inner.vm = vm;
                inner.uploads.clear();
                inner.booted = false;
            }
            Err(err) => {
                tracing::error!("failed to rebuild workspace after delete_history: {err}");
                return json!({
                    "history_cleared": false,
                    "error": err.to_string(),
                });
            }
        }

        json!({
            "history_cleared": true,
            "cleared_messages": history_length,
            "workspace": {
                "removed": removed,
                "deployments": {
                    "removed_ids": deployments.removed_ids,
                    "errors": deployments.errors,
                },
            },
            "vm": {
                "history_length": 0,
                "workspace_token": inner.workspace.token,
            },
        })
    }

    /// `register_uploaded_files`: upserts by `name`, then regenerates and installs the
    /// system prompt with the trailing upload listing.
    pub async fn register_uploaded_files(&self, files: Vec<UploadedFileRecord>) {
        let mut inner = self.inner.lock().await;
        for file in files {
            match inner.uploads.iter_mut().find(|u| u.name == file.name) {
                Some(existing) => *existing = file,
                None => inner.uploads.push(file),
            }
        }
        let prompt = build_system_prompt(&inner.workspace, &inner.uploads);
        inner.vm.update_system_prompt(prompt).await;
    }

    pub async fn uploads(&self) -> Vec<UploadedFileRecord> {
        self.inner.lock().await.uploads.clone()
    }

    pub async fn info(&self) -> Value {
        let inner = self.inner.lock().await;
        let history = inner.vm.history().await;
        json!({
            "client_id": self.client_id,
            "history_length": history.len(),
            "workspace_token": inner.workspace.token,
            "uploads": inner.uploads,
        })
    }

    pub async fn history_entry(&self, id: &str) -> Option<HistoryEntry> {
        self.inner.lock().await.vm.get_history_entry(id).await
    }

    pub async fn workspace_handle(&self) -> Arc<Workspace> {
        self.inner.lock().await.workspace.clone()
    }

    pub async fn list_snapshots(&self, limit: usize) -> Result<Vec<SnapshotInfo>, WorkspaceError> {
        self.inner.lock().await.workspace.list_snapshots(limit)
    }

    pub async fn create_snapshot(&self, label: Option<&str>) -> Result<Option<String>, WorkspaceError> {
        self.inner.lock().await.workspace.snapshot(label)
    }

    pub async fn restore_snapshot(
        &self,
        commit_id: Option<&str>,
        branch: Option<&str>,
        checkout: bool,
    ) -> Result<bool, WorkspaceError> {
        self.inner.lock().await.workspace.restore(commit_id, branch, checkout)
    }

    pub async fn ensure_branch(
        &self,
        name: &str,
        commit_id: Option<&str>,
        checkout: bool,
    ) -> Result<(), WorkspaceError> {
        self.inner.lock().await.workspace.ensure_branch(name, commit_id, checkout)
    }

    pub async fn describe_head(&self) -> Result<HeadDescription, WorkspaceError> {
        self.inner.lock().await.workspace.describe_head()
    }
}

fn build_system_prompt(workspace: &Workspace, uploads: &[UploadedFileRecord]) -> String {
    let mut prompt = workspace.adapt_prompt(BASE_SYSTEM_PROMPT);
    if !uploads.is_empty() {
        prompt.push_str("\n\n用户上传的文件:\n");
        for upload in uploads {
            prompt.push_str(&format!(
                "- {} ({}, {})\n",
                upload.name,
                upload.relative_path,
                format_size(upload.size_bytes)
            ));
        }
    }
    prompt
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Bridges the Agent Runtime's [`ToolEventSink`] callback to a [`StreamingBus`] without the agent crate depending on the bus directly.
struct BusToolSink<'a> {
    bus: &'a StreamingBus,
}

impl<'a> BusToolSink<'a> {
    fn new(bus: &'a StreamingBus) -> Self {
        Self { bus }
    }
}

impl<'a> ToolEventSink for BusToolSink<'a> {
    fn tool_started(&self, invocation_id: &str, tool_name: &str, input: &Value) {
        self.bus.tool_started(invocation_id, tool_name, input.clone());
    }

    fn tool_completed(
        &self,
        invocation_id: &str,
        tool_name: &str,
        success: bool,
        output: Option<&str>,
        error: Option<&str>,
        elapsed: Duration,
    ) {
        self.bus
            .tool_completed_after(invocation_id, tool_name, success, elapsed, output, error);
    }
}

/// The raw preview fields found on one tool call, before base-URL/`client_id` normalisation.
struct PreviewRaw {
    html: Option<String>,
    url: Option<String>,
    title: Option<String>,
    deployment_id: Option<String>,
}

#[derive(Default)]
struct ExtractedTurn {
    summary: Option<String>,
    preview: Option<PreviewRaw>,
    slides: Vec<Value>,
    artifacts: Vec<String>,
}

/// step 3: walk `tool_calls` in reverse (most recent first) so the most recent non-empty
/// output wins the summary and the most recent tool call that actually carries preview-shaped
/// data wins the preview, while still collecting slides/artifacts from every call.
fn extract_preview(tool_calls: &[ToolCallTrace]) -> ExtractedTurn {
    let mut out = ExtractedTurn::default();
    let mut seen_artifacts = std::collections::HashSet::new();

    for call in tool_calls.iter().rev() {
        let output = &call.tool_output.output;
        let data = &call.tool_output.data;

        if out.summary.is_none() {
            if let Some(o) = output {
                if !o.is_empty() {
                    out.summary = Some(o.clone());
                }
            }
        }

        if out.preview.is_none() {
            out.preview = probe_preview(data.as_ref());
        }

        if let Some(Value::Object(map)) = data {
            if let Some(Value::Array(slides)) = map.get("slides") {
                let mut collected = slides.clone();
                collected.append(&mut out.slides);
                out.slides = collected;
            }
            if let Some(Value::Array(artifacts)) = map.get("artifacts") {
                for artifact in artifacts {
                    if let Some(url) = artifact.as_str() {
                        if seen_artifacts.insert(url.to_string()) {
                            out.artifacts.push(url.to_string());
                        }
                    }
                }
            }
        }

        if let Some(preview) = &out.preview {
            if let Some(url) = &preview.url {
                if seen_artifacts.insert(url.clone()) {
                    out.artifacts.push(url.clone());
                }
            }
        }
    }

    out.artifacts.reverse();
    out
}

fn probe_str<'a>(map: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| map.get(*k).and_then(|v| v.as_str()))
}

/// Treats `map` as deployment-shaped if it directly carries a preview URL field, else looks for
/// a nested `deployment` object.
fn deployment_like<'a>(map: &'a serde_json::Map<String, Value>) -> Option<&'a serde_json::Map<String, Value>> {
    if map.contains_key("preview_url") || map.contains_key("server_preview_url") {
        return Some(map);
    }
    map.get("deployment").and_then(|v| v.as_object())
}

fn probe_preview(data: Option<&Value>) -> Option<PreviewRaw> {
    let map = data.and_then(|d| d.as_object())?;

    let html = probe_str(map, &["html", "rendered_html", "content"]).map(str::to_string);
    let mut url = probe_str(map, &["preview_url", "url", "href", "server_preview_url"]).map(str::to_string);
    let mut title = probe_str(map, &["title", "name"]).map(str::to_string);
    let mut deployment_id = map.get("id").and_then(|v| v.as_str()).map(str::to_string);

    if let Some(dep) = deployment_like(map) {
        url = url.or_else(|| probe_str(dep, &["preview_url", "server_preview_url"]).map(str::to_string));
        title = title.or_else(|| probe_str(dep, &["name", "slug"]).map(str::to_string));
        deployment_id = deployment_id.or_else(|| dep.get("id").and_then(|v| v.as_str()).map(str::to_string));
    }

    if html.is_none() && url.is_none() {
        return None;
    }
    Some(PreviewRaw { html, url, title, deployment_id })
}

fn is_scheme_less(url: &str) -> bool {
    !url.contains("://")
}

/// step 4: resolve a scheme-less preview URL against the configured preview base URL, then
/// append `client_id` when the URL is relative or points at that same local/preview host and has
/// no existing `client_id` — the narrower interpretation `DESIGN.md` records for the Open
/// Question ("only local/preview hosts are modified").
fn normalize_preview(raw: PreviewRaw, preview_base: Option<&str>, client_id: &str) -> Value {
    let mut url = raw.url;

    if let Some(u) = &url {
        if is_scheme_less(u) {
            if let Some(base) = preview_base {
                url = Some(format!("{}{u}", base.trim_end_matches('/')));
            }
        }
    }

    if let Some(u) = &url {
        if !u.contains("client_id=") && is_local_or_preview_host(u, preview_base) {
            let sep = if u.contains('?') { "&" } else { "?" };
            url = Some(format!("{u}{sep}client_id={client_id}"));
        }
    }

    json!({
        "html": raw.html,
        "url": url,
        "title": raw.title,
        "deployment_id": raw.deployment_id,
    })
}

fn is_local_or_preview_host(url: &str, preview_base: Option<&str>) -> bool {
    if is_scheme_less(url) {
        return true;
    }
    match preview_base {
        Some(base) => url.starts_with(base.trim_end_matches('/')),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_renders_human_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(100 * 1024 * 1024), "100.0 MiB");
    }

    #[test]
    fn probe_preview_reads_deploy_tool_shape() {
        let data = json!({
            "id": "761043",
            "name": "launch-page",
            "slug": "launch-page",
            "session_id": "alice",
            "timestamp": "2026-01-01T00:00:00Z",
            "source": "/mnt/a",
            "target": "/deployments/761043",
            "preview_url": "/?s=761043&path=index.html",
            "entry_path": "index.html",
        });
        let preview = probe_preview(Some(&data)).unwrap();
        assert_eq!(preview.url.as_deref(), Some("/?s=761043&path=index.html"));
        assert_eq!(preview.title.as_deref(), Some("launch-page"));
        assert_eq!(preview.deployment_id.as_deref(), Some("761043"));
    }

    #[test]
    fn probe_preview_returns_none_for_slides_shape() {
        let data = json!({"path": "/mnt/slides.pptx", "slides": [{"title": "A", "bullets": []}]});
        assert!(probe_preview(Some(&data)).is_none());
    }

    #[test]
    fn normalize_preview_resolves_base_and_appends_client_id() {
        let raw = PreviewRaw {
            html: None,
            url: Some("/?s=761043&path=index.html".to_string()),
            title: Some("launch-page".to_string()),
            deployment_id: Some("761043".to_string()),
        };
        let normalized = normalize_preview(raw, Some("https://preview.invalid"), "alice");
        assert_eq!(
            normalized["url"].as_str().unwrap(),
            "https://preview.invalid/?s=761043&path=index.html&client_id=alice"
        );
    }

    #[test]
    fn normalize_preview_does_not_duplicate_existing_client_id() {
        let raw = PreviewRaw {
            html: None,
            url: Some("https://preview.invalid/?s=1&client_id=bob".to_string()),
            title: None,
            deployment_id: None,
        };
        let normalized = normalize_preview(raw, Some("https://preview.invalid"), "alice");
        assert_eq!(
            normalized["url"].as_str().unwrap(),
            "https://preview.invalid/?s=1&client_id=bob"
        );
    }

    #[test]
    fn extract_preview_prefers_latest_call_with_preview_and_latest_non_empty_summary() {
        use okcvm_protocol::ToolResult;

        let deploy_call = ToolCallTrace {
            tool_name: "mshtools-deploy_website".to_string(),
            tool_input: json!({}),
            tool_output: ToolResult::ok(
                "Deployed 'site' to /?s=761043&path=index.html (id 761043)",
                Some(json!({
                    "id": "761043",
                    "name": "site",
                    "preview_url": "/?s=761043&path=index.html",
                })),
            ),
        };
        let write_call = ToolCallTrace {
            tool_name: "mshtools-files_write".to_string(),
            tool_input: json!({}),
            tool_output: ToolResult::ok("Wrote file index.html", None),
        };

        let extracted = extract_preview(&[deploy_call, write_call]);
        assert!(extracted.summary.unwrap().starts_with("Wrote file"));
        let preview = extracted.preview.unwrap();
        assert_eq!(preview.deployment_id.as_deref(), Some("761043"));
        assert!(extracted.artifacts.contains(&"/?s=761043&path=index.html".to_string()));
    }
}
