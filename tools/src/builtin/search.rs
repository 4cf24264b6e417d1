//! Web and image search tools, both backed by DuckDuckGo's unauthenticated endpoints.

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use regex::Regex;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_WEB_SEARCH: &str = "mshtools-web_search";
pub const TOOL_IMAGE_SEARCH: &str = "mshtools-image_search";

const USER_AGENT: &str = "OKCVM/1.0 (+https://github.com/free-agent-challenge/free-OKC)";

#[derive(serde::Serialize)]
struct SearchHit {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// Walks a DuckDuckGo Instant Answer `RelatedTopics` array, flattening nested `Topics` groups
/// the same way the original's recursive `_flatten_topics` does.
fn flatten_topics(topics: &[Value], out: &mut Vec<SearchHit>, limit: usize) {
    for topic in topics {
        if out.len() >= limit {
            return;
        }
        if let Some(nested) = topic.get("Topics").and_then(|v| v.as_array()) {
            flatten_topics(nested, out, limit);
            continue;
        }
        let text = topic
            .get("Text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        out.push(SearchHit {
            text: text.to_string(),
            url: topic
                .get("FirstURL")
                .and_then(|v| v.as_str())
                .map(String::from),
        });
    }
}

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_WEB_SEARCH
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_WEB_SEARCH.to_string(),
            description: Some(
                "Searches the web via DuckDuckGo's Instant Answer API and returns up to \
                 `count` (default 5) results."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "count": {"type": "integer"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let query = match args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q,
            None => return ToolResult::failure("'query' is required"),
        };
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        let response = ctx
            .http
            .get("https://api.duckduckgo.com/")
            .header("User-Agent", USER_AGENT)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("no_redirect", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) => return ToolResult::failure(format!("search request failed: {e}")),
        };
        let body: Value = match response.json().await {
            Ok(b) => b,
            Err(e) => return ToolResult::failure(format!("search response was not JSON: {e}")),
        };

        let mut hits = Vec::new();
        let abstract_text = body.get("AbstractText").and_then(|v| v.as_str()).unwrap_or("");
        if !abstract_text.is_empty() {
            hits.push(SearchHit {
                text: abstract_text.to_string(),
                url: body
                    .get("AbstractURL")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            });
        }
        if let Some(related) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            flatten_topics(related, &mut hits, count);
        }
        hits.truncate(count);

        let summary = if hits.is_empty() {
            format!("no results for '{query}'")
        } else {
            format!("found {} results for '{query}'", hits.len())
        };
        ToolResult {
            success: true,
            output: Some(summary),
            data: Some(json!({"results": hits})),
            error: None,
        }
    }
}

pub struct ImageSearchTool;

#[async_trait]
impl Tool for ImageSearchTool {
    fn name(&self) -> &str {
        TOOL_IMAGE_SEARCH
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_IMAGE_SEARCH.to_string(),
            description: Some(
                "Searches DuckDuckGo images; fetches a page token first, then queries the \
                 image results endpoint with it."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "count": {"type": "integer"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let query = match args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q,
            None => return ToolResult::failure("'query' is required"),
        };
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        let token_page = match ctx
            .http
            .get("https://duckduckgo.com/")
            .header("User-Agent", USER_AGENT)
            .query(&[("q", query)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::failure(format!("token request failed: {e}")),
        };
        let token_html = match token_page.text().await {
            Ok(t) => t,
            Err(e) => return ToolResult::failure(format!("token response read failed: {e}")),
        };

        let token_re = Regex::new(r#"vqd=['"]?([\d-]+)['"]?"#).unwrap();
        let Some(token) = token_re
            .captures(&token_html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return ToolResult::failure("could not locate a search token on the results page");
        };

        let images = match ctx
            .http
            .get("https://duckduckgo.com/i.js")
            .header("User-Agent", USER_AGENT)
            .query(&[("q", query), ("vqd", token.as_str()), ("o", "json")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::failure(format!("image search request failed: {e}")),
        };
        let body: Value = match images.json().await {
            Ok(b) => b,
            Err(e) => return ToolResult::failure(format!("image search response was not JSON: {e}")),
        };

        let mut hits = Vec::new();
        if let Some(results) = body.get("results").and_then(|v| v.as_array()) {
            for entry in results {
                if hits.len() >= count {
                    break;
                }
                let image_url = entry.get("image").and_then(|v| v.as_str());
                let title = entry.get("title").and_then(|v| v.as_str()).unwrap_or("");
                if let Some(image_url) = image_url {
                    hits.push(json!({"title": title, "image": image_url}));
                }
            }
        }

        let summary = if hits.is_empty() {
            format!("no images found for '{query}'")
        } else {
            format!("found {} images for '{query}'", hits.len())
        };
        ToolResult {
            success: true,
            output: Some(summary),
            data: Some(json!({"results": hits})),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_topics_descends_nested_groups() {
        let topics = json!([
            {"Text": "top-level", "FirstURL": "https://a"},
            {"Name": "Category", "Topics": [
                {"Text": "nested", "FirstURL": "https://b"}
            ]}
        ]);
        let mut out = Vec::new();
        flatten_topics(topics.as_array().unwrap(), &mut out, 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "top-level");
        assert_eq!(out[1].text, "nested");
    }

    #[test]
    fn flatten_topics_respects_limit() {
        let topics = json!([
            {"Text": "a", "FirstURL": "https://a"},
            {"Text": "b", "FirstURL": "https://b"},
            {"Text": "c", "FirstURL": "https://c"}
        ]);
        let mut out = Vec::new();
        flatten_topics(topics.as_array().unwrap(), &mut out, 2);
        assert_eq!(out.len(), 2);
    }
}
