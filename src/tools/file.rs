//! File tool operating on the sandbox filesystem

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{require_str, Tool, ToolFunction, ToolResult};
use crate::sandbox::Sandbox;

pub struct FileTool {
    sandbox: Arc<dyn Sandbox>,
}

impl FileTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        "file"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![
            ToolFunction::new(
                "file_read",
                "Read a file from the sandbox filesystem.",
                serde_json::json!({
                    "file": {"type": "string", "description": "Absolute file path"},
                }),
                &["file"],
            ),
            ToolFunction::new(
                "file_write",
                "Write content to a file in the sandbox filesystem.",
                serde_json::json!({
                    "file": {"type": "string", "description": "Absolute file path"},
                    "content": {"type": "string", "description": "Content to write"},
                    "append": {"type": "boolean", "description": "Append instead of overwrite"},
                }),
                &["file", "content"],
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        let path = match require_str(args, "file") {
            Ok(path) => path,
            Err(failure) => return failure,
        };

        let result = match function_name {
            "file_read" => self.sandbox.file_read(path).await,
            "file_write" => {
                let content = args
                    .get("content")
                    .and_then(|content| content.as_str())
                    .unwrap_or_default();
                let append = args
                    .get("append")
                    .and_then(|append| append.as_bool())
                    .unwrap_or(false);
                self.sandbox.file_write(path, content, append).await
            }
            other => return ToolResult::fail(format!("Unknown file function: {other}")),
        };

        result.unwrap_or_else(|err| ToolResult::fail(err.to_string()))
    }
}
