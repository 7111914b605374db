//! MCP server configuration
//!
//! Read from a JSON file of the shape
//! `{ "mcpServers": { name: {command?, args?, env?, url?, headers?,
//! transport, enabled, description?} } }`. The file is operator-managed;
//! a missing or unreadable file yields an empty config.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_transport() -> String {
    "stdio".to_string()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

#[derive(Clone)]
pub struct McpConfigRepository {
    path: PathBuf,
}

impl McpConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn get_mcp_config(&self) -> Result<McpConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => Ok(config),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "Invalid MCP config, using empty");
                    Ok(McpConfig::default())
                }
            },
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "MCP config not readable, using empty");
                Ok(McpConfig::default())
            }
        }
    }

    pub async fn save_mcp_config(&self, config: &McpConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(config)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse() {
        let raw = r#"{
            "mcpServers": {
                "bigmodel_search": {
                    "transport": "streamable-http",
                    "url": "https://example.invalid/mcp",
                    "headers": {"Authorization": "Bearer token"},
                    "enabled": true
                },
                "local": {
                    "command": "npx",
                    "args": ["-y", "@some/mcp-server"]
                }
            }
        }"#;
        let config: McpConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.mcp_servers.len(), 2);
        let local = &config.mcp_servers["local"];
        assert!(local.enabled);
        assert_eq!(local.transport, "stdio");
        assert_eq!(local.args, vec!["-y", "@some/mcp-server"]);
    }
}
