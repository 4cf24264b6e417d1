//! Data source metadata and retrieval tools. The registry currently carries one data
//! source, `yahoo_finance`, with a single `quote` API.

use async_trait::async_trait;
use okcvm_protocol::ToolResult;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::spec::ToolSpec;
use crate::trait_def::Tool;

pub const TOOL_GET_DATA_SOURCE_DESC: &str = "mshtools-get_data_source_desc";
pub const TOOL_GET_DATA_SOURCE: &str = "mshtools-get_data_source";

struct DataSourceApi {
    name: &'static str,
    description: &'static str,
    parameters: &'static [(&'static str, &'static str)],
}

struct DataSource {
    name: &'static str,
    description: &'static str,
    apis: &'static [DataSourceApi],
}

const YAHOO_FINANCE: DataSource = DataSource {
    name: "yahoo_finance",
    description: "Yahoo Finance provides free market data including quotes, company profiles, \
                   and historical information.",
    apis: &[DataSourceApi {
        name: "quote",
        description: "Fetch the latest market quote for one or more tickers.",
        parameters: &[("symbol", "Ticker symbol to query (e.g. AAPL)")],
    }],
};

const DATA_SOURCES: &[DataSource] = &[YAHOO_FINANCE];

fn find_data_source(name: &str) -> Option<&'static DataSource> {
    DATA_SOURCES.iter().find(|d| d.name == name)
}

fn serialize_data_source(source: &DataSource) -> Value {
    let apis: serde_json::Map<String, Value> = source
        .apis
        .iter()
        .map(|api| {
            let params: serde_json::Map<String, Value> = api
                .parameters
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect();
            (
                api.name.to_string(),
                json!({"description": api.description, "parameters": params}),
            )
        })
        .collect();
    json!({
        "name": source.name,
        "description": source.description,
        "apis": apis,
    })
}

pub struct GetDataSourceDescTool;

#[async_trait]
impl Tool for GetDataSourceDescTool {
    fn name(&self) -> &str {
        TOOL_GET_DATA_SOURCE_DESC
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_DATA_SOURCE_DESC.to_string(),
            description: Some(
                "Returns static metadata describing a named data source and its APIs.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {"data_source": {"type": "string"}},
                "required": ["data_source"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> ToolResult {
        let source_name = match args
            .get("data_source")
            .or_else(|| args.get("name"))
            .and_then(|v| v.as_str())
        {
            Some(s) if !s.is_empty() => s,
            _ => return ToolResult::failure("'data_source' is required"),
        };
        let Some(source) = find_data_source(source_name) else {
            return ToolResult::failure(format!("Unknown data source '{source_name}'"));
        };
        ToolResult {
            success: true,
            output: Some(format!("Found data source {source_name}")),
            data: Some(serialize_data_source(source)),
            error: None,
        }
    }
}

pub struct GetDataSourceTool;

#[async_trait]
impl Tool for GetDataSourceTool {
    fn name(&self) -> &str {
        TOOL_GET_DATA_SOURCE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_GET_DATA_SOURCE.to_string(),
            description: Some("Executes a named API on a data source.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "data_source": {"type": "string"},
                    "api": {"type": "string"},
                    "parameters": {"type": "object"}
                },
                "required": ["data_source", "api"]
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let source_name = match args
            .get("data_source")
            .or_else(|| args.get("name"))
            .and_then(|v| v.as_str())
        {
            Some(s) if !s.is_empty() => s,
            _ => return ToolResult::failure("'data_source' is required"),
        };
        let api_name = match args.get("api").and_then(|v| v.as_str()) {
            Some(a) if !a.is_empty() => a,
            _ => return ToolResult::failure("'api' is required"),
        };
        let parameters = args.get("parameters").cloned().unwrap_or(json!({}));

        let Some(source) = find_data_source(source_name) else {
            return ToolResult::failure(format!("Unknown data source '{source_name}'"));
        };
        if !source.apis.iter().any(|a| a.name == api_name) {
            return ToolResult::failure(format!(
                "Data source '{source_name}' has no API named '{api_name}'"
            ));
        }

        if source_name == "yahoo_finance" && api_name == "quote" {
            return fetch_yahoo_quote(&parameters, ctx).await;
        }

        ToolResult::failure(format!(
            "API '{api_name}' is not implemented for data source '{source_name}'"
        ))
    }
}

async fn fetch_yahoo_quote(parameters: &Value, ctx: &ToolContext) -> ToolResult {
    let symbol = match parameters.get("symbol").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return ToolResult::failure("'symbol' parameter is required for the quote API"),
    };

    let response = ctx
        .http
        .get("https://query1.finance.yahoo.com/v7/finance/quote")
        .query(&[("symbols", symbol)])
        .send()
        .await;
    let response = match response {
        Ok(r) => r,
        Err(e) => return ToolResult::failure(format!("quote request failed: {e}")),
    };
    if !response.status().is_success() {
        return ToolResult::failure(format!("quote request failed: HTTP {}", response.status()));
    }
    let payload: Value = match response.json().await {
        Ok(p) => p,
        Err(e) => return ToolResult::failure(format!("quote response was not JSON: {e}")),
    };

    let quotes = payload
        .pointer("/quoteResponse/result")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let Some(quote) = quotes.first() else {
        return ToolResult::failure(format!("No data returned for symbol '{symbol}'"));
    };

    let data = json!({
        "symbol": quote.get("symbol"),
        "shortName": quote.get("shortName"),
        "currency": quote.get("currency"),
        "regularMarketPrice": quote.get("regularMarketPrice"),
        "regularMarketChangePercent": quote.get("regularMarketChangePercent"),
    });
    ToolResult {
        success: true,
        output: Some(format!("Fetched quote for {symbol}")),
        data: Some(data),
        error: None,
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
    async fn describes_yahoo_finance() {
        let (_dir, ctx) = ctx();
        let tool = GetDataSourceDescTool;
        let result = tool
            .call(json!({"data_source": "yahoo_finance"}), &ctx)
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["name"], "yahoo_finance");
    }

    #[tokio::test]
    async fn unknown_data_source_fails() {
        let (_dir, ctx) = ctx();
        let tool = GetDataSourceDescTool;
        let result = tool.call(json!({"data_source": "nope"}), &ctx).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn unknown_api_fails() {
        let (_dir, ctx) = ctx();
        let tool = GetDataSourceTool;
        let result = tool
            .call(
                json!({"data_source": "yahoo_finance", "api": "history"}),
                &ctx,
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn quote_requires_symbol_parameter() {
        let (_dir, ctx) = ctx();
        let tool = GetDataSourceTool;
        let result = tool
            .call(
                json!({"data_source": "yahoo_finance", "api": "quote", "parameters": {}}),
                &ctx,
            )
            .await;
        assert!(!result.success);
    }
}
