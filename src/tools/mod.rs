//! Tool dispatch layer
//!
//! Every capability the executor may invoke implements one polymorphic
//! contract: a named tool exposing function schemas and an `invoke` that
//! returns a structured result. Failures are values, never panics; the
//! executor decides whether to retry or re-plan.

pub mod browser;
pub mod file;
pub mod mcp;
pub mod message;
pub mod search;
pub mod shell;
pub mod ssh_node;
pub mod ticket;

pub use browser::BrowserTool;
pub use file::FileTool;
pub use mcp::{McpClientManager, McpTool};
pub use message::MessageTool;
pub use search::{build_search_engine, SearchEngine, SearchTool};
pub use shell::ShellTool;
pub use ssh_node::SshNodeTool;
pub use ticket::TicketTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform result returned by every tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            message: String::new(),
            data: Some(data),
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Description of one callable function within a tool
#[derive(Debug, Clone)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    /// JSON schema `properties` object
    pub parameters: Value,
    pub required: Vec<String>,
}

impl ToolFunction {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        required: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            required: required.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// OpenAI function-tool schema for this function
    pub fn schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.parameters,
                    "required": self.required,
                }
            }
        })
    }
}

/// A named capability exposing one or more callable functions
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool family name (used for event enrichment routing)
    fn name(&self) -> &str;

    fn functions(&self) -> Vec<ToolFunction>;

    fn has_function(&self, function_name: &str) -> bool {
        self.functions()
            .iter()
            .any(|function| function.name == function_name)
    }

    /// Function-tool schemas exposed to the model. Tools with dynamic
    /// surfaces (MCP) override this to return their native schemas.
    fn schemas(&self) -> Vec<Value> {
        self.functions()
            .iter()
            .map(ToolFunction::schema)
            .collect()
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult;
}

/// The tool registry owned by one flow's agents
#[derive(Clone)]
pub struct ToolSet {
    tools: Vec<std::sync::Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<std::sync::Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().flat_map(|tool| tool.schemas()).collect()
    }

    pub fn tool_for(&self, function_name: &str) -> Option<&std::sync::Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.has_function(function_name))
    }

    /// Dispatch a function call; returns the owning tool's name alongside
    /// the result. Unknown functions fail as values.
    pub async fn invoke(&self, function_name: &str, args: &Value) -> (String, ToolResult) {
        match self.tool_for(function_name) {
            Some(tool) => (tool.name().to_string(), tool.invoke(function_name, args).await),
            None => (
                "unknown".to_string(),
                ToolResult::fail(format!("Unknown tool function: {function_name}")),
            ),
        }
    }
}

/// Pull a required string argument, or fail with a uniform message
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    args.get(key)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ToolResult::fail(format!("Missing required argument: {key}")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_function_schema() {
        let function = ToolFunction::new(
            "shell_exec",
            "Run a command",
            serde_json::json!({"command": {"type": "string"}}),
            &["command"],
        );
        let schema = function.schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "shell_exec");
        assert_eq!(schema["function"]["parameters"]["required"][0], "command");
    }

    #[test]
    fn test_require_str() {
        let args = serde_json::json!({"command": "ls", "empty": "  "});
        assert_eq!(require_str(&args, "command").unwrap(), "ls");
        assert!(require_str(&args, "empty").is_err());
        assert!(require_str(&args, "missing").is_err());
    }

    #[test]
    fn test_tool_result_round_trip() {
        let result = ToolResult::ok(serde_json::json!({"output": "done"}));
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ToolResult = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap()["output"], "done");

        let failure = ToolResult::fail("approval_required");
        assert!(!failure.success);
        assert_eq!(failure.message, "approval_required");
    }
}
