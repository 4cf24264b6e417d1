//! Per-session tool context: the workspace handle plus the small slices of stateful
//! data individual tools carry across calls within one session (todo list, IPython globals,
//! the single active browser page).

use std::sync::Arc;

use okcvm_workspace::Workspace;
use tokio::sync::Mutex;

/// One persisted todo entry.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: String,
}

/// Shared, mutable IPython-like interpreter state: globals persist as a
/// serialized namespace across calls; the interpreter itself is out of scope for this tool set,
/// so `globals` holds the surfaced variable bindings the fake interpreter tracks.
#[derive(Default, Debug)]
pub struct IpythonState {
    pub globals: serde_json::Map<String, serde_json::Value>,
}

/// A clickable element (link, button, submit input) enumerated on the active browser page.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PageElement {
    pub index: usize,
    pub kind: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// A text-accepting input/textarea element enumerated on the active browser page.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct InputElement {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub input_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub value: String,
}

/// A single text match surfaced by `browser_find`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FindMatch {
    pub text: String,
    pub tag: String,
}

/// The single active browser page. Only the "static mode" code path
/// (plain HTTP GET + HTML parse, no headless browser) is implemented.
#[derive(Default, Debug)]
pub struct BrowserState {
    pub url: Option<String>,
    pub title: String,
    pub html: String,
    pub elements: Vec<PageElement>,
    pub inputs: Vec<InputElement>,
    pub last_find_results: Vec<FindMatch>,
    pub scroll_position: i64,
}

/// Per-session stateful data shared across tool calls in one session.
#[derive(Default)]
pub struct SessionToolState {
    pub todos: Mutex<Vec<TodoItem>>,
    pub ipython: Mutex<IpythonState>,
    pub browser: Mutex<BrowserState>,
}

/// Bundles everything a tool call needs: the workspace sandbox (when `requires_workspace`)
/// and the session's stateful tool data.
pub struct ToolContext {
    pub workspace: Arc<Workspace>,
    pub state: Arc<SessionToolState>,
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(workspace: Arc<Workspace>, state: Arc<SessionToolState>) -> Self {
        Self {
            workspace,
            state,
            http: reqwest::Client::new(),
        }
    }
}
