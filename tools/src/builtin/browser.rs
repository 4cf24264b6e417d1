//! Browser tools: a single active page per session, "static mode" only — a plain HTTP
//! GET plus HTML parse, no headless browser.

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use scraper::{Html, Node, Selector};
use serde_json::{json, Value};

use crate::context::{BrowserState, FindMatch, InputElement, PageElement, ToolContext};
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_BROWSER_VISIT: &str = "mshtools-browser_visit";
pub const TOOL_BROWSER_STATE: &str = "mshtools-browser_state";
pub const TOOL_BROWSER_FIND: &str = "mshtools-browser_find";
pub const TOOL_BROWSER_CLICK: &str = "mshtools-browser_click";
pub const TOOL_BROWSER_INPUT: &str = "mshtools-browser_input";
pub const TOOL_BROWSER_SCROLL_UP: &str = "mshtools-browser_scroll_up";
pub const TOOL_BROWSER_SCROLL_DOWN: &str = "mshtools-browser_scroll_down";

const USER_AGENT: &str = "OKCVM/1.0 (+https://github.com/free-agent-challenge/free-OKC)";

fn parse_page(html: &str, current_url: &str) -> (String, Vec<PageElement>, Vec<InputElement>) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let clickable_sel =
        Selector::parse("a[href], button, input[type=submit], input[type=button]").unwrap();
    let base = url::Url::parse(current_url).ok();
    let mut clickables = Vec::new();
    for (index, el) in document.select(&clickable_sel).enumerate() {
        let tag = el.value().name().to_string();
        let text = el.text().collect::<String>().trim().to_string();
        let text = if text.is_empty() {
            el.value().attr("aria-label").unwrap_or("").to_string()
        } else {
            text
        };
        let href = el.value().attr("href").map(|h| {
            base.as_ref()
                .and_then(|b| b.join(h).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| h.to_string())
        });
        clickables.push(PageElement {
            index,
            kind: tag,
            text,
            href,
        });
    }

    let input_sel = Selector::parse("input, textarea").unwrap();
    let mut inputs = Vec::new();
    for el in document.select(&input_sel) {
        let tag = el.value().name();
        let declared_type = el.value().attr("type").unwrap_or("");
        let is_text_like = tag == "textarea" || declared_type.is_empty() || declared_type == "text";
        if !is_text_like {
            continue;
        }
        let index = inputs.len();
        let input_type = if tag == "textarea" {
            "textarea".to_string()
        } else {
            "text".to_string()
        };
        inputs.push(InputElement {
            index,
            name: el.value().attr("name").map(|s| s.to_string()),
            input_type,
            placeholder: el.value().attr("placeholder").map(|s| s.to_string()),
            value: el.value().attr("value").unwrap_or("").to_string(),
        });
    }

    (title, clickables, inputs)
}

async fn fetch(ctx: &ToolContext, url: &str) -> Result<String, String> {
    let response = ctx
        .http
        .get(url)
        .header("User-Agent", USER_AGENT)
        .timeout(std::time::Duration::from_secs(15))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("request to {url} failed: {}", response.status()));
    }
    response.text().await.map_err(|e| e.to_string())
}

fn serialize(state: &BrowserState) -> Value {
    json!({
        "current_url": state.url,
        "title": state.title,
        "scroll_position": state.scroll_position,
        "html": state.html,
        "clickable_elements": state.elements,
        "inputs": state.inputs,
        "last_find_results": state.last_find_results,
    })
}

pub struct BrowserVisitTool;

#[async_trait]
impl Tool for BrowserVisitTool {
    fn name(&self) -> &str {
        TOOL_BROWSER_VISIT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_BROWSER_VISIT.to_string(),
            description: Some(
                "Loads a page (http/https only) and returns its title, clickable elements and \
                 text inputs."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let url = match args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u,
            None => return ToolResult::failure("'url' is required"),
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::failure("only http:// and https:// URLs are supported");
        }

        let html = match fetch(ctx, url).await {
            Ok(html) => html,
            Err(e) => return ToolResult::failure(format!("error visiting {url}: {e}")),
        };
        let (title, clickables, inputs) = parse_page(&html, url);

        let mut state = ctx.state.browser.lock().await;
        state.url = Some(url.to_string());
        state.title = title.clone();
        state.html = html;
        state.elements = clickables;
        state.inputs = inputs;
        state.scroll_position = 0;
        state.last_find_results.clear();

        let summary = if title.is_empty() {
            format!("Loaded {url}")
        } else {
            format!("Loaded {title} ({url})")
        };
        ToolResult {
            success: true,
            output: Some(summary),
            data: Some(serialize(&state)),
            error: None,
        }
    }
}

pub struct BrowserStateTool;

#[async_trait]
impl Tool for BrowserStateTool {
    fn name(&self) -> &str {
        TOOL_BROWSER_STATE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_BROWSER_STATE.to_string(),
            description: Some("Re-reads the current page's state.".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: Value, ctx: &ToolContext) -> ToolResult {
        let state = ctx.state.browser.lock().await;
        if state.url.is_none() {
            return ToolResult::failure("no active browser session; call browser_visit first");
        }
        ToolResult {
            success: true,
            output: Some("current browser state".to_string()),
            data: Some(serialize(&state)),
            error: None,
        }
    }
}

pub struct BrowserFindTool;

#[async_trait]
impl Tool for BrowserFindTool {
    fn name(&self) -> &str {
        TOOL_BROWSER_FIND
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_BROWSER_FIND.to_string(),
            description: Some(
                "Searches the current page's text for a match, capped at 20 results by default."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "limit": {"type": "integer"}
                },
                "required": ["text"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let term = match args.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::failure("'text' is required"),
        };
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(20) as usize;

        let mut state = ctx.state.browser.lock().await;
        if state.url.is_none() {
            return ToolResult::failure("no active browser session; call browser_visit first");
        }

        let document = Html::parse_document(&state.html);
        let lower_term = term.to_lowercase();
        let mut matches = Vec::new();

        for node in document.tree.nodes() {
            if matches.len() >= limit {
                break;
            }
            let Node::Text(text) = node.value() else {
                continue;
            };
            let candidate = text.trim();
            if candidate.is_empty() || !candidate.to_lowercase().contains(&lower_term) {
                continue;
            }
            let tag = node
                .parent()
                .and_then(|p| p.value().as_element())
                .map(|el| el.name().to_string())
                .unwrap_or_default();
            let snippet = if candidate.chars().count() > 240 {
                let truncated: String = candidate.chars().take(237).collect();
                format!("{truncated}...")
            } else {
                candidate.to_string()
            };
            matches.push(FindMatch { text: snippet, tag });
        }

        let summary = if matches.is_empty() {
            format!("no matches found for '{term}'")
        } else {
            format!("found {} matches for '{term}'", matches.len())
        };
        state.last_find_results = matches.clone();

        ToolResult {
            success: true,
            output: Some(summary),
            data: Some(json!({"matches": matches})),
            error: None,
        }
    }
}

pub struct BrowserClickTool;

#[async_trait]
impl Tool for BrowserClickTool {
    fn name(&self) -> &str {
        TOOL_BROWSER_CLICK
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_BROWSER_CLICK.to_string(),
            description: Some(
                "Follows a clickable element's hyperlink (navigates) or records the click."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {"element_index": {"type": "integer"}},
                "required": ["element_index"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let index = match args.get("element_index").and_then(|v| v.as_u64()) {
            Some(i) => i as usize,
            None => return ToolResult::failure("'element_index' is required"),
        };

        let (target_url, current_url, element_text) = {
            let state = ctx.state.browser.lock().await;
            if state.url.is_none() {
                return ToolResult::failure("no active browser session; call browser_visit first");
            }
            let element = match state.elements.get(index) {
                Some(e) => e,
                None => return ToolResult::failure("element_index out of range"),
            };
            (
                element.href.clone().or_else(|| state.url.clone()),
                state.url.clone().unwrap_or_default(),
                element.text.clone(),
            )
        };

        let Some(target_url) = target_url else {
            return ToolResult::failure("clicked element has no destination");
        };

        let html = match fetch(ctx, &target_url).await {
            Ok(html) => html,
            Err(e) => return ToolResult::failure(format!("error navigating to {target_url}: {e}")),
        };
        let (title, clickables, inputs) = parse_page(&html, &target_url);

        let mut state = ctx.state.browser.lock().await;
        state.url = Some(target_url.clone());
        state.title = title;
        state.html = html;
        state.elements = clickables;
        state.inputs = inputs;
        state.scroll_position = 0;
        state.last_find_results.clear();

        let preview: String = element_text.chars().take(30).collect();
        let mut summary = format!("clicked element {index} ('{preview}')");
        if target_url != current_url {
            summary.push_str(&format!(" and navigated to {target_url}"));
        }

        ToolResult {
            success: true,
            output: Some(summary),
            data: Some(serialize(&state)),
            error: None,
        }
    }
}

pub struct BrowserInputTool;

#[async_trait]
impl Tool for BrowserInputTool {
    fn name(&self) -> &str {
        TOOL_BROWSER_INPUT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_BROWSER_INPUT.to_string(),
            description: Some("Sets a text input's value.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "element_index": {"type": "integer"},
                    "text": {"type": "string"}
                },
                "required": ["element_index", "text"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let index = match args.get("element_index").and_then(|v| v.as_u64()) {
            Some(i) => i as usize,
            None => return ToolResult::failure("'element_index' is required"),
        };
        let text = match args.get("text").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::failure("'text' is required"),
        };

        let mut state = ctx.state.browser.lock().await;
        if state.url.is_none() {
            return ToolResult::failure("no active browser session; call browser_visit first");
        }
        let Some(input) = state.inputs.get_mut(index) else {
            return ToolResult::failure("element_index out of range");
        };
        input.value = text.to_string();
        let data = serde_json::to_value(&*input).unwrap();

        ToolResult {
            success: true,
            output: Some(format!("filled input {index}")),
            data: Some(data),
            error: None,
        }
    }
}

struct ScrollTool {
    name: &'static str,
    direction: i64,
}

#[async_trait]
impl Tool for ScrollTool {
    fn name(&self) -> &str {
        self.name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.to_string(),
            description: Some("Adjusts the virtual scroll position, clamped at zero.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {"scroll_amount": {"type": "integer"}}
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let amount = args
            .get("scroll_amount")
            .and_then(|v| v.as_i64())
            .unwrap_or(400);

        let mut state = ctx.state.browser.lock().await;
        if state.url.is_none() {
            return ToolResult::failure("no active browser session; call browser_visit first");
        }
        state.scroll_position = (state.scroll_position + self.direction * amount).max(0);

        let direction_word = if self.direction > 0 { "down" } else { "up" };
        let summary = format!("scrolled {direction_word} to position {}", state.scroll_position);
        ToolResult {
            success: true,
            output: Some(summary),
            data: Some(serialize(&state)),
            error: None,
        }
    }
}

pub fn browser_scroll_down_tool() -> impl Tool {
    ScrollTool {
        name: TOOL_BROWSER_SCROLL_DOWN,
        direction: 1,
    }
}

pub fn browser_scroll_up_tool() -> impl Tool {
    ScrollTool {
        name: TOOL_BROWSER_SCROLL_UP,
        direction: -1,
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
    async fn scroll_clamps_at_zero() {
        let (_dir, ctx) = ctx();
        ctx.state.browser.lock().await.url = Some("http://example.invalid".to_string());
        let up = browser_scroll_up_tool();
        let result = up.call(json!({"scroll_amount": 1000}), &ctx).await;
        assert_eq!(result.data.unwrap()["scroll_position"], 0);
    }

    #[tokio::test]
    async fn find_rejects_without_active_session() {
        let (_dir, ctx) = ctx();
        let find = BrowserFindTool;
        let result = find.call(json!({"text": "hello"}), &ctx).await;
        assert!(!result.success);
    }

    #[test]
    fn parse_page_extracts_title_and_links() {
        let html = r#"<html><head><title>Hi</title></head><body><a href="/a">Link</a></body></html>"#;
        let (title, clickables, _inputs) = parse_page(html, "http://example.invalid/");
        assert_eq!(title, "Hi");
        assert_eq!(clickables.len(), 1);
        assert_eq!(clickables[0].href.as_deref(), Some("http://example.invalid/a"));
    }
}
