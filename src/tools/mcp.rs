//! MCP client manager and tool
//!
//! Connects the enabled servers from the session's MCP config over stdio,
//! SSE, or streamable HTTP, caches their tool lists, and exposes every
//! remote tool as `mcp_<server>_<tool>`. Initialization is best-effort: a
//! failing server is logged and skipped, never aborting the task.

use std::borrow::Cow;
use std::collections::HashMap;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::RunningService;
use rmcp::transport::sse_client::SseClientConfig;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{
    ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;

use super::{Tool, ToolFunction, ToolResult};
use crate::store::{McpConfig, McpServerConfig};

type McpClient = RunningService<RoleClient, ()>;

/// Known BigModel servers whose endpoint and transport are pinned no matter
/// what the user config says.
fn bigmodel_canonical(server_name: &str) -> Option<(&'static str, Option<&'static str>)> {
    // (transport, url); stdio entries carry no url
    match server_name {
        "bigmodel_search" => Some((
            "streamable-http",
            Some("https://open.bigmodel.cn/api/mcp/web_search_prime/mcp"),
        )),
        "bigmodel_reader" => Some((
            "streamable-http",
            Some("https://open.bigmodel.cn/api/mcp/web_reader/mcp"),
        )),
        "bigmodel_zread" => Some((
            "streamable-http",
            Some("https://open.bigmodel.cn/api/mcp/zread/mcp"),
        )),
        "bigmodel_vision" => Some(("stdio", None)),
        _ => None,
    }
}

const BIGMODEL_SEARCH_ALLOWED: &[&str] = &[
    "search_query",
    "search_domain_filter",
    "search_recency_filter",
    "content_size",
    "location",
];
const BIGMODEL_SEARCH_RECENCY: &[&str] = &["oneDay", "oneWeek", "oneMonth", "oneYear", "noLimit"];
const BIGMODEL_SEARCH_CONTENT_SIZE: &[&str] = &["medium", "high"];
const BIGMODEL_SEARCH_LOCATION: &[&str] = &["cn", "us"];
const BIGMODEL_READER_ALLOWED: &[&str] = &[
    "url",
    "timeout",
    "no_cache",
    "return_format",
    "retain_images",
    "no_gfm",
    "keep_img_data_url",
    "with_images_summary",
    "with_links_summary",
];
const MAX_SEARCH_QUERY_LEN: usize = 70;

/// Multi-transport MCP client pool, one per task runner
pub struct McpClientManager {
    config: McpConfig,
    clients: HashMap<String, McpClient>,
    tools_cache: HashMap<String, Vec<rmcp::model::Tool>>,
    initialized: bool,
}

impl McpClientManager {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
            tools_cache: HashMap::new(),
            initialized: false,
        }
    }

    /// Connect all enabled servers. Always completes; per-server failures
    /// only shrink the tool surface.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        tracing::info!(
            servers = self.config.mcp_servers.len(),
            "Initializing MCP client manager"
        );

        let names: Vec<String> = self.config.mcp_servers.keys().cloned().collect();
        for server_name in names {
            let mut server_config = self.config.mcp_servers[&server_name].clone();
            normalize_bigmodel_server_config(&server_name, &mut server_config);
            server_config.headers = sanitize_headers(&server_config.headers);
            if !server_config.enabled {
                continue;
            }
            if !is_server_connectable(&server_name, &server_config) {
                continue;
            }

            match Self::connect_server(&server_name, &server_config).await {
                Ok(client) => {
                    let tools = match client.peer().list_all_tools().await {
                        Ok(tools) => {
                            tracing::info!(
                                server = %server_name,
                                tools = tools.len(),
                                "MCP server connected"
                            );
                            tools
                        }
                        Err(err) => {
                            tracing::error!(server = %server_name, error = %err, "Failed to list MCP tools");
                            Vec::new()
                        }
                    };
                    self.tools_cache.insert(server_name.clone(), tools);
                    self.clients.insert(server_name.clone(), client);
                    self.config.mcp_servers.insert(server_name, server_config);
                }
                Err(err) => {
                    tracing::error!(server = %server_name, error = %err, "Failed to connect MCP server");
                }
            }
        }

        self.initialized = true;
    }

    async fn connect_server(
        server_name: &str,
        config: &McpServerConfig,
    ) -> Result<McpClient, String> {
        match config.transport.as_str() {
            "stdio" => {
                let command = config
                    .command
                    .as_deref()
                    .ok_or_else(|| format!("server {server_name} has no command"))?;
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(&config.args)
                            .envs(config.env.iter())
                            .stderr(std::process::Stdio::inherit());
                    }),
                )
                .map_err(|e| format!("create stdio transport: {e}"))?;
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| format!("initialize stdio client: {e}"))
            }
            "http" | "sse" => {
                let url = config
                    .url
                    .as_deref()
                    .ok_or_else(|| format!("server {server_name} has no url"))?;
                let client = http_client_with_headers(&config.headers)?;
                let transport = SseClientTransport::start_with_client(
                    client,
                    SseClientConfig {
                        sse_endpoint: url.to_string().into(),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| format!("create SSE transport: {e}"))?;
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| format!("initialize SSE client: {e}"))
            }
            "streamable-http" => {
                let url = config
                    .url
                    .as_deref()
                    .ok_or_else(|| format!("server {server_name} has no url"))?;
                let transport = match bearer_token(&config.headers) {
                    Some(token) => {
                        let mut cfg = StreamableHttpClientTransportConfig::with_uri(url.to_string());
                        cfg.auth_header = Some(format!("Bearer {token}"));
                        StreamableHttpClientTransport::from_config(cfg)
                    }
                    None => StreamableHttpClientTransport::from_uri(url.to_string()),
                };
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| format!("initialize streamable client: {e}"))
            }
            other => Err(format!("unsupported transport: {other}")),
        }
    }

    /// Function-tool schemas for every cached remote tool
    pub fn all_tool_schemas(&self) -> Vec<Value> {
        let mut schemas = Vec::new();
        for (server_name, tools) in &self.tools_cache {
            for tool in tools {
                let exposed = exposed_tool_name(server_name, &tool.name);
                let description = tool
                    .description
                    .as_deref()
                    .unwrap_or(tool.name.as_ref())
                    .to_string();
                schemas.push(serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": exposed,
                        "description": format!("[{server_name}] {description}"),
                        "parameters": Value::Object((*tool.input_schema).clone()),
                    }
                }));
            }
        }
        schemas
    }

    /// Exposed function names
    pub fn function_names(&self) -> Vec<String> {
        self.tools_cache
            .iter()
            .flat_map(|(server_name, tools)| {
                tools
                    .iter()
                    .map(|tool| exposed_tool_name(server_name, &tool.name))
            })
            .collect()
    }

    /// Invoke `mcp_<server>_<tool>` and flatten the response
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> ToolResult {
        let Some((server_name, original_tool_name)) =
            resolve_tool_name(&self.config, tool_name)
        else {
            return ToolResult::fail(format!("Cannot resolve MCP tool name: {tool_name}"));
        };

        let Some(client) = self.clients.get(&server_name) else {
            return ToolResult::fail(format!("MCP server {server_name} is not connected"));
        };

        let arguments = normalize_bigmodel_arguments(&server_name, &original_tool_name, arguments);
        let arguments_map = arguments.as_object().cloned();

        let request = CallToolRequestParam {
            name: Cow::Owned(original_tool_name.clone()),
            arguments: arguments_map,
        };

        let result = match client.peer().call_tool(request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(tool = tool_name, error = %err, "MCP tool call failed");
                return ToolResult::fail(format!("MCP tool call failed: {err}"));
            }
        };

        let merged = flatten_content_text(
            &serde_json::to_value(&result.content).unwrap_or(Value::Null),
        );
        let merged = if merged.is_empty() {
            "Tool executed successfully".to_string()
        } else {
            merged
        };

        let normalized = parse_deep_json(Value::String(merged.clone()), 4);
        // An empty BigModel search result set is a retrieval failure; report
        // it as such so the executor falls back to the built-in search.
        if server_name == "bigmodel_search" {
            if let Value::Array(items) = &normalized {
                if items.is_empty() {
                    return ToolResult {
                        success: false,
                        message: "BigModel Search MCP returned empty results. \
                                  Fallback to built-in search tool, then use MCP Reader for URL extraction."
                            .to_string(),
                        data: Some(Value::String(merged)),
                    };
                }
            }
        }

        ToolResult::ok(Value::String(merged))
    }

    /// Cancel every client and drop the caches
    pub async fn cleanup(&mut self) {
        for (server_name, client) in self.clients.drain() {
            if let Err(err) = client.cancel().await {
                tracing::warn!(server = %server_name, error = %err, "MCP client shutdown failed");
            }
        }
        self.tools_cache.clear();
        self.initialized = false;
        tracing::info!("MCP client manager cleaned up");
    }
}

fn normalize_bigmodel_server_config(server_name: &str, config: &mut McpServerConfig) {
    let Some((transport, url)) = bigmodel_canonical(server_name) else {
        return;
    };
    config.transport = transport.to_string();
    if let Some(url) = url {
        config.url = Some(url.to_string());
    }
    if server_name == "bigmodel_vision" {
        config.command = Some("npx".to_string());
        config.args = vec!["-y".to_string(), "@z_ai/mcp-server".to_string()];
    }
}

/// Drop empty values and Authorization headers with no usable token
fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    let mut cleaned = HashMap::new();
    for (key, value) in headers {
        let text = value.trim();
        if text.is_empty() {
            continue;
        }
        if key.eq_ignore_ascii_case("authorization") {
            let lower = text.to_lowercase();
            if lower == "bearer" || lower == "bearer:" {
                continue;
            }
            if lower.starts_with("bearer ") && text[7..].trim().is_empty() {
                continue;
            }
        }
        cleaned.insert(key.clone(), text.to_string());
    }
    cleaned
}

fn bearer_token(headers: &HashMap<String, String>) -> Option<String> {
    headers.iter().find_map(|(key, value)| {
        if !key.eq_ignore_ascii_case("authorization") {
            return None;
        }
        let text = value.trim();
        if text.to_lowercase().starts_with("bearer ") {
            let token = text[7..].trim();
            (!token.is_empty()).then(|| token.to_string())
        } else {
            None
        }
    })
}

/// BigModel HTTP servers are useless without a Bearer token; skip early
/// instead of burning a connection attempt.
fn is_server_connectable(server_name: &str, config: &McpServerConfig) -> bool {
    if matches!(config.transport.as_str(), "sse" | "streamable-http" | "http")
        && server_name.starts_with("bigmodel_")
        && bearer_token(&config.headers).is_none()
    {
        tracing::warn!(server = %server_name, "Skipping MCP server: missing Authorization Bearer token");
        return false;
    }
    true
}

fn http_client_with_headers(headers: &HashMap<String, String>) -> Result<reqwest::Client, String> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| format!("bad header name {key}: {e}"))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| format!("bad header value for {key}: {e}"))?;
        header_map.insert(name, value);
    }
    reqwest::Client::builder()
        .default_headers(header_map)
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| format!("build HTTP client: {e}"))
}

/// `mcp_<server>_<tool>`, avoiding a double `mcp_` prefix for servers whose
/// name already carries one.
fn exposed_tool_name(server_name: &str, tool_name: &str) -> String {
    if server_name.starts_with("mcp_") {
        format!("{server_name}_{tool_name}")
    } else {
        format!("mcp_{server_name}_{tool_name}")
    }
}

/// Reverse of `exposed_tool_name` against the configured server set
fn resolve_tool_name(config: &McpConfig, tool_name: &str) -> Option<(String, String)> {
    for server_name in config.mcp_servers.keys() {
        let expected_prefix = if server_name.starts_with("mcp_") {
            server_name.clone()
        } else {
            format!("mcp_{server_name}")
        };
        if let Some(rest) = tool_name.strip_prefix(&format!("{expected_prefix}_")) {
            if !rest.is_empty() {
                return Some((server_name.clone(), rest.to_string()));
            }
        }
    }
    None
}

/// Join the `text` fields of a serialized content list
fn flatten_content_text(content: &Value) -> String {
    let Value::Array(items) = content else {
        return String::new();
    };
    items
        .iter()
        .map(|item| {
            item.get("text")
                .and_then(|text| text.as_str())
                .map(|text| text.to_string())
                .unwrap_or_else(|| item.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode nested JSON strings up to `max_depth` passes
fn parse_deep_json(value: Value, max_depth: usize) -> Value {
    let mut current = value;
    for _ in 0..max_depth {
        let Value::String(text) = &current else {
            break;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            break;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(parsed) => {
                if parsed == current {
                    break;
                }
                current = parsed;
            }
            Err(_) => break,
        }
    }
    current
}

/// Normalize arguments to the official BigModel schemas: map aliases, keep
/// whitelisted keys only, clamp values into the documented enums.
fn normalize_bigmodel_arguments(server_name: &str, tool_name: &str, arguments: Value) -> Value {
    let Some(args) = arguments.as_object() else {
        return arguments;
    };
    let mut args = args.clone();

    if server_name == "bigmodel_search" && tool_name == "webSearchPrime" {
        if !args.contains_key("search_query") {
            for alias in ["query", "keyword", "q"] {
                if let Some(value) = args.get(alias).cloned() {
                    if !value_is_blank(&value) {
                        args.insert("search_query".into(), value);
                        break;
                    }
                }
            }
        }
        if !args.contains_key("search_domain_filter") {
            for alias in ["domain", "site"] {
                if let Some(value) = args.get(alias).cloned() {
                    if !value_is_blank(&value) {
                        args.insert("search_domain_filter".into(), value);
                        break;
                    }
                }
            }
        }
        if !args.contains_key("search_recency_filter") {
            for alias in ["date_range", "recency", "time_range"] {
                if let Some(value) = args.get(alias).and_then(|v| v.as_str()) {
                    let value = value.trim();
                    if value.is_empty() {
                        continue;
                    }
                    let mapped = match value {
                        "past_day" | "day" => "oneDay",
                        "past_week" | "week" => "oneWeek",
                        "past_month" | "month" => "oneMonth",
                        "past_year" | "year" => "oneYear",
                        other => other,
                    };
                    args.insert("search_recency_filter".into(), Value::String(mapped.into()));
                    break;
                }
            }
        }

        args.retain(|key, value| {
            BIGMODEL_SEARCH_ALLOWED.contains(&key.as_str()) && !value_is_blank(value)
        });

        let mut query = args
            .get("search_query")
            .and_then(|q| q.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if query.chars().count() > MAX_SEARCH_QUERY_LEN {
            query = query.chars().take(MAX_SEARCH_QUERY_LEN).collect();
        }
        args.insert("search_query".into(), Value::String(query));

        if let Some(recency) = args.get("search_recency_filter").and_then(|v| v.as_str()) {
            if !BIGMODEL_SEARCH_RECENCY.contains(&recency.trim()) {
                args.remove("search_recency_filter");
            }
        }
        match args.get("content_size").and_then(|v| v.as_str()) {
            Some(size) if BIGMODEL_SEARCH_CONTENT_SIZE.contains(&size.trim()) => {}
            _ => {
                args.insert("content_size".into(), Value::String("high".into()));
            }
        }
        if let Some(location) = args.get("location").and_then(|v| v.as_str()) {
            let lowered = location.trim().to_lowercase();
            if BIGMODEL_SEARCH_LOCATION.contains(&lowered.as_str()) {
                args.insert("location".into(), Value::String(lowered));
            } else {
                args.remove("location");
            }
        }

        tracing::info!(args = ?args, "BigModel search normalized args");
        return Value::Object(args);
    }

    if server_name == "bigmodel_reader" && tool_name == "webReader" {
        if !args.contains_key("url") {
            for alias in ["link", "uri"] {
                if let Some(value) = args.get(alias).cloned() {
                    if !value_is_blank(&value) {
                        args.insert("url".into(), value);
                        break;
                    }
                }
            }
        }
        args.retain(|key, value| {
            BIGMODEL_READER_ALLOWED.contains(&key.as_str()) && !value_is_blank(value)
        });
        if !args.contains_key("return_format") {
            args.insert("return_format".into(), Value::String("markdown".into()));
        }
        tracing::info!(args = ?args, "BigModel reader normalized args");
        return Value::Object(args);
    }

    Value::Object(args)
}

fn value_is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Executor-facing tool exposing the manager's cached surface
pub struct McpTool {
    manager: tokio::sync::Mutex<McpClientManager>,
    schemas: std::sync::RwLock<Vec<Value>>,
    names: std::sync::RwLock<Vec<String>>,
}

impl Default for McpTool {
    fn default() -> Self {
        Self::new()
    }
}

impl McpTool {
    pub fn new() -> Self {
        Self {
            manager: tokio::sync::Mutex::new(McpClientManager::new(McpConfig::default())),
            schemas: std::sync::RwLock::new(Vec::new()),
            names: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Connect the configured servers and snapshot the tool surface.
    /// Best-effort and idempotent.
    pub async fn initialize(&self, config: McpConfig) {
        let mut manager = self.manager.lock().await;
        if !manager.initialized {
            *manager = McpClientManager::new(config);
            manager.initialize().await;
        }
        *self.schemas.write().unwrap_or_else(|e| e.into_inner()) = manager.all_tool_schemas();
        *self.names.write().unwrap_or_else(|e| e.into_inner()) = manager.function_names();
    }

    pub async fn cleanup(&self) {
        self.manager.lock().await.cleanup().await;
        self.schemas
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.names
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        "mcp"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        // Remote tools carry their own schemas; see `schemas()`.
        Vec::new()
    }

    fn schemas(&self) -> Vec<Value> {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn has_function(&self, function_name: &str) -> bool {
        self.names
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|name| name == function_name)
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        let manager = self.manager.lock().await;
        manager.call_tool(function_name, args.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(name: &str) -> McpConfig {
        let mut config = McpConfig::default();
        config
            .mcp_servers
            .insert(name.to_string(), McpServerConfig::default());
        config
    }

    #[test]
    fn test_exposed_and_resolved_names() {
        assert_eq!(exposed_tool_name("bigmodel_search", "webSearchPrime"),
            "mcp_bigmodel_search_webSearchPrime");
        assert_eq!(exposed_tool_name("mcp_custom", "run"), "mcp_custom_run");

        let config = config_with("bigmodel_search");
        let (server, tool) =
            resolve_tool_name(&config, "mcp_bigmodel_search_webSearchPrime").unwrap();
        assert_eq!(server, "bigmodel_search");
        assert_eq!(tool, "webSearchPrime");

        let prefixed = config_with("mcp_custom");
        let (server, tool) = resolve_tool_name(&prefixed, "mcp_custom_run").unwrap();
        assert_eq!(server, "mcp_custom");
        assert_eq!(tool, "run");

        assert!(resolve_tool_name(&config, "not_an_mcp_tool").is_none());
    }

    #[test]
    fn test_sanitize_headers() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".into(), "Bearer ".into());
        headers.insert("X-Empty".into(), "   ".into());
        headers.insert("X-Keep".into(), " value ".into());
        let cleaned = sanitize_headers(&headers);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned["X-Keep"], "value");

        headers.insert("Authorization".into(), "Bearer token123".into());
        let cleaned = sanitize_headers(&headers);
        assert_eq!(cleaned["Authorization"], "Bearer token123");
        assert_eq!(bearer_token(&cleaned).unwrap(), "token123");
    }

    #[test]
    fn test_bigmodel_server_skipped_without_token() {
        let mut config = McpServerConfig {
            transport: "streamable-http".into(),
            url: Some("https://example.invalid".into()),
            ..Default::default()
        };
        assert!(!is_server_connectable("bigmodel_search", &config));

        config
            .headers
            .insert("Authorization".into(), "Bearer tok".into());
        assert!(is_server_connectable("bigmodel_search", &config));

        // Non-bigmodel servers connect regardless
        let bare = McpServerConfig {
            transport: "sse".into(),
            ..Default::default()
        };
        assert!(is_server_connectable("other", &bare));
    }

    #[test]
    fn test_parse_deep_json() {
        let nested = Value::String("\"{\\\"a\\\": 1}\"".to_string());
        let parsed = parse_deep_json(nested, 4);
        assert_eq!(parsed["a"], 1);

        let plain = Value::String("not json".into());
        assert_eq!(parse_deep_json(plain.clone(), 4), plain);

        let list = Value::String("[]".into());
        assert_eq!(parse_deep_json(list, 4), Value::Array(vec![]));
    }

    #[test]
    fn test_normalize_search_arguments() {
        let args = serde_json::json!({
            "query": "today news",
            "date_range": "past_week",
            "content_size": "gigantic",
            "location": "CN",
            "unrelated": "drop me",
        });
        let normalized = normalize_bigmodel_arguments("bigmodel_search", "webSearchPrime", args);
        assert_eq!(normalized["search_query"], "today news");
        assert_eq!(normalized["search_recency_filter"], "oneWeek");
        assert_eq!(normalized["content_size"], "high");
        assert_eq!(normalized["location"], "cn");
        assert!(normalized.get("unrelated").is_none());
        assert!(normalized.get("query").is_none());
    }

    #[test]
    fn test_normalize_search_trims_long_query() {
        let long_query = "q".repeat(100);
        let args = serde_json::json!({"search_query": long_query});
        let normalized = normalize_bigmodel_arguments("bigmodel_search", "webSearchPrime", args);
        assert_eq!(
            normalized["search_query"].as_str().unwrap().chars().count(),
            MAX_SEARCH_QUERY_LEN
        );
    }

    #[test]
    fn test_normalize_reader_arguments() {
        let args = serde_json::json!({"link": "https://example.com", "junk": 1});
        let normalized = normalize_bigmodel_arguments("bigmodel_reader", "webReader", args);
        assert_eq!(normalized["url"], "https://example.com");
        assert_eq!(normalized["return_format"], "markdown");
        assert!(normalized.get("junk").is_none());
    }

    #[test]
    fn test_flatten_content_text() {
        let content = serde_json::json!([
            {"type": "text", "text": "first"},
            {"type": "text", "text": "second"},
        ]);
        assert_eq!(flatten_content_text(&content), "first\nsecond");
        assert_eq!(flatten_content_text(&Value::Null), "");
    }

    #[test]
    fn test_bigmodel_canonical_pins_transport() {
        let mut config = McpServerConfig {
            transport: "sse".into(),
            url: Some("https://user-override.invalid".into()),
            ..Default::default()
        };
        normalize_bigmodel_server_config("bigmodel_reader", &mut config);
        assert_eq!(config.transport, "streamable-http");
        assert_eq!(
            config.url.as_deref(),
            Some("https://open.bigmodel.cn/api/mcp/web_reader/mcp")
        );
    }
}
