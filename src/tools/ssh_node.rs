//! SSH node tool
//!
//! Exposes registered server nodes to the executor. Commands on nodes that
//! require approval come back as `approval_required`, which the execution
//! agent translates into a Wait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{require_str, Tool, ToolFunction, ToolResult};
use crate::services::NodeService;

pub struct SshNodeTool {
    node_service: Arc<NodeService>,
    user_id: String,
    session_id: String,
}

impl SshNodeTool {
    pub fn new(
        node_service: Arc<NodeService>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            node_service,
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl Tool for SshNodeTool {
    fn name(&self) -> &str {
        "ssh"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![
            ToolFunction::new(
                "ssh_node_list",
                "List configured server nodes available for remote SSH operations.",
                serde_json::json!({}),
                &[],
            ),
            ToolFunction::new(
                "ssh_node_exec",
                "Execute one command on a remote server node over SSH. \
                 Use this only for remote node operations, not for local sandbox commands.",
                serde_json::json!({
                    "node_id": {"type": "string", "description": "Target server node id"},
                    "command": {"type": "string", "description": "SSH command to execute"},
                }),
                &["node_id", "command"],
            ),
            ToolFunction::new(
                "ssh_node_monitor",
                "Read remote node runtime information: uname, uptime, memory and disk.",
                serde_json::json!({
                    "node_id": {"type": "string", "description": "Target server node id"},
                }),
                &["node_id"],
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        match function_name {
            "ssh_node_list" => match self.node_service.list_nodes(&self.user_id).await {
                Ok(nodes) => ToolResult::ok(serde_json::json!({
                    "nodes": nodes
                        .iter()
                        .map(|node| serde_json::json!({
                            "node_id": node.id,
                            "name": node.name,
                            "description": node.description,
                            "remarks": node.remarks,
                            "ssh_enabled": node.ssh_enabled,
                            "ssh_require_approval": node.ssh_require_approval,
                        }))
                        .collect::<Vec<_>>()
                })),
                Err(err) => ToolResult::fail(err.to_string()),
            },
            "ssh_node_exec" => {
                let node_id = match require_str(args, "node_id") {
                    Ok(node_id) => node_id,
                    Err(failure) => return failure,
                };
                let command = match require_str(args, "command") {
                    Ok(command) => command,
                    Err(failure) => return failure,
                };
                let tool_call_id = args
                    .get("tool_call_id")
                    .and_then(|id| id.as_str())
                    .map(|id| id.to_string());
                self.node_service
                    .execute_ai_command(&self.user_id, &self.session_id, node_id, command, tool_call_id)
                    .await
                    .unwrap_or_else(|err| ToolResult::fail(err.to_string()))
            }
            "ssh_node_monitor" => {
                let node_id = match require_str(args, "node_id") {
                    Ok(node_id) => node_id,
                    Err(failure) => return failure,
                };
                match self
                    .node_service
                    .get_monitor_info(&self.user_id, node_id)
                    .await
                {
                    Ok(info) => ToolResult::ok(
                        serde_json::json!({"node_id": node_id, "monitor": info}),
                    ),
                    Err(err) => ToolResult::fail(err.to_string()),
                }
            }
            other => ToolResult::fail(format!("Unknown ssh function: {other}")),
        }
    }
}
