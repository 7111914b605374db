//! Shell tool running commands inside the session sandbox

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{optional_str, require_str, Tool, ToolFunction, ToolResult};
use crate::sandbox::Sandbox;

pub struct ShellTool {
    sandbox: Arc<dyn Sandbox>,
}

impl ShellTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![
            ToolFunction::new(
                "shell_exec",
                "Execute a command in a named shell session inside the sandbox.",
                serde_json::json!({
                    "id": {"type": "string", "description": "Shell session id"},
                    "exec_dir": {"type": "string", "description": "Working directory, absolute path"},
                    "command": {"type": "string", "description": "Command to execute"},
                }),
                &["id", "command"],
            ),
            ToolFunction::new(
                "shell_view",
                "View the console output of a shell session.",
                serde_json::json!({
                    "id": {"type": "string", "description": "Shell session id"},
                }),
                &["id"],
            ),
            ToolFunction::new(
                "shell_wait",
                "Wait for the running command in a shell session to finish.",
                serde_json::json!({
                    "id": {"type": "string", "description": "Shell session id"},
                    "seconds": {"type": "integer", "description": "Maximum seconds to wait"},
                }),
                &["id"],
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        let shell_id = match require_str(args, "id") {
            Ok(id) => id,
            Err(failure) => return failure,
        };

        let result = match function_name {
            "shell_exec" => {
                let command = match require_str(args, "command") {
                    Ok(command) => command,
                    Err(failure) => return failure,
                };
                self.sandbox
                    .exec_shell(shell_id, optional_str(args, "exec_dir"), command)
                    .await
            }
            "shell_view" => self.sandbox.view_shell(shell_id).await,
            "shell_wait" => {
                let seconds = args.get("seconds").and_then(|s| s.as_u64()).unwrap_or(30);
                self.sandbox.wait_shell(shell_id, seconds).await
            }
            other => return ToolResult::fail(format!("Unknown shell function: {other}")),
        };

        result.unwrap_or_else(|err| ToolResult::fail(err.to_string()))
    }
}
