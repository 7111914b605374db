//! Server node service: SSH execution, approvals, and health overview

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ssh;
use crate::error::{Error, Result};
use crate::models::{
    AgentEvent, SshApprovalStatus, SshAuthType, SshCommandApproval, SshNode, SshOperationLog,
};
use crate::store::{NodeStore, SessionStore};
use crate::tools::ToolResult;

const MAX_NODES_PER_USER: i64 = 8;
const MAX_LOG_LIMIT: i64 = 300;
const TAKEOVER_OUTPUT_CAP: usize = 4000;

/// The canonical multi-probe command behind the node overview
const OVERVIEW_COMMAND: &str = concat!(
    "printf 'HOSTNAME=%s\\n' \"$(hostname)\"; ",
    "printf 'OS_NAME=%s\\n' \"$(. /etc/os-release 2>/dev/null; echo ${PRETTY_NAME:-unknown})\"; ",
    "printf 'KERNEL=%s\\n' \"$(uname -r)\"; ",
    "printf 'UPTIME=%s\\n' \"$(uptime -p 2>/dev/null || uptime)\"; ",
    "printf 'LOAD_AVG=%s\\n' \"$(cat /proc/loadavg 2>/dev/null | awk '{print $1\" \"$2\" \"$3}')\"; ",
    "printf 'MEM_TOTAL_KB=%s\\n' \"$(grep MemTotal /proc/meminfo 2>/dev/null | awk '{print $2}')\"; ",
    "printf 'MEM_AVAILABLE_KB=%s\\n' \"$(grep MemAvailable /proc/meminfo 2>/dev/null | awk '{print $2}')\"; ",
    "printf 'ROOT_DISK=%s\\n' \"$(df -Pk / 2>/dev/null | tail -1 | awk '{print $2\" \"$3\" \"$5}')\"",
);

/// Mutable node fields accepted from the API
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodePayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub remarks: Option<String>,
    pub ssh_enabled: Option<bool>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,
    pub ssh_auth_type: Option<SshAuthType>,
    pub ssh_password: Option<String>,
    pub ssh_private_key: Option<String>,
    pub ssh_passphrase: Option<String>,
    pub ssh_require_approval: Option<bool>,
}

impl NodePayload {
    fn apply(self, node: &mut SshNode) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(description) = self.description {
            node.description = Some(description);
        }
        if let Some(remarks) = self.remarks {
            node.remarks = Some(remarks);
        }
        if let Some(enabled) = self.ssh_enabled {
            node.ssh_enabled = enabled;
        }
        if let Some(host) = self.ssh_host {
            node.ssh_host = Some(host);
        }
        if let Some(port) = self.ssh_port {
            node.ssh_port = port;
        }
        if let Some(username) = self.ssh_username {
            node.ssh_username = Some(username);
        }
        if let Some(auth_type) = self.ssh_auth_type {
            node.ssh_auth_type = auth_type;
        }
        if let Some(password) = self.ssh_password {
            node.ssh_password = Some(password);
        }
        if let Some(private_key) = self.ssh_private_key {
            node.ssh_private_key = Some(private_key);
        }
        if let Some(passphrase) = self.ssh_passphrase {
            node.ssh_passphrase = Some(passphrase);
        }
        if let Some(require_approval) = self.ssh_require_approval {
            node.ssh_require_approval = require_approval;
        }
        node.updated_at = Utc::now();
    }
}

/// One derived health metric on the overview card
#[derive(Debug, Clone, Serialize)]
pub struct OverviewMetric {
    pub label: String,
    pub value: String,
    pub hint: String,
    pub level: String,
}

pub struct NodeService {
    nodes: NodeStore,
    sessions: SessionStore,
}

impl NodeService {
    pub fn new(nodes: NodeStore, sessions: SessionStore) -> Self {
        Self { nodes, sessions }
    }

    pub async fn list_nodes(&self, user_id: &str) -> Result<Vec<SshNode>> {
        self.nodes.list_nodes(user_id).await
    }

    pub async fn create_node(&self, user_id: &str, payload: NodePayload) -> Result<SshNode> {
        let count = self.nodes.count_nodes(user_id).await?;
        if count >= MAX_NODES_PER_USER {
            return Err(Error::BadRequest(
                "You can add at most 8 server nodes".into(),
            ));
        }
        let name = payload
            .name
            .clone()
            .ok_or_else(|| Error::Validation("Node name is required".into()))?;
        let mut node = SshNode::new(user_id, name);
        payload.apply(&mut node);
        self.nodes.save_node(&node).await?;
        Ok(node)
    }

    pub async fn update_node(
        &self,
        user_id: &str,
        node_id: &str,
        payload: NodePayload,
    ) -> Result<SshNode> {
        let mut node = self.get_node(user_id, node_id).await?;
        payload.apply(&mut node);
        self.nodes.save_node(&node).await?;
        Ok(node)
    }

    pub async fn delete_node(&self, user_id: &str, node_id: &str) -> Result<()> {
        self.nodes.delete_node(node_id, user_id).await
    }

    pub async fn get_node(&self, user_id: &str, node_id: &str) -> Result<SshNode> {
        self.nodes
            .get_node(node_id, Some(user_id))
            .await?
            .ok_or_else(|| Error::NotFound("Node not found".into()))
    }

    /// Run a command on a node as some actor; always logged.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_command(
        &self,
        user_id: &str,
        node_id: &str,
        command: &str,
        exec_dir: Option<&str>,
        actor_type: &str,
        actor_id: Option<&str>,
        source: &str,
        session_id: Option<&str>,
    ) -> Result<ToolResult> {
        let node = self.get_node(user_id, node_id).await?;
        if !node.ssh_enabled {
            return Err(Error::BadRequest("SSH is not enabled for this node".into()));
        }

        let mut final_command = command.trim().to_string();
        if let Some(dir) = exec_dir.filter(|dir| !dir.trim().is_empty()) {
            final_command = format!("cd {dir} && {final_command}");
        }

        let (success, output) = ssh::exec_command(&node, &final_command).await;

        let log = SshOperationLog {
            session_id: session_id.map(str::to_string),
            actor_type: actor_type.to_string(),
            actor_id: actor_id.map(str::to_string),
            source: source.to_string(),
            output: output.clone(),
            success,
            ..SshOperationLog::new(&node.id, final_command.clone())
        };
        self.nodes.add_log(&log).await?;

        Ok(ToolResult {
            success,
            message: if success { "success" } else { "command failed" }.to_string(),
            data: Some(serde_json::json!({
                "command": final_command,
                "output": output,
                "node_id": node.id,
                "node_name": node.name,
                "success": success,
            })),
        })
    }

    pub async fn get_monitor_info(&self, user_id: &str, node_id: &str) -> Result<String> {
        let result = self
            .run_command(
                user_id,
                node_id,
                "uname -a && echo '---' && uptime && echo '---' && free -h && echo '---' && df -h",
                None,
                "system",
                None,
                "monitor",
                None,
            )
            .await?;
        Ok(result
            .data
            .and_then(|data| data.get("output").and_then(|o| o.as_str()).map(str::to_string))
            .unwrap_or_default())
    }

    /// Probe the node and derive a health summary
    pub async fn get_node_overview(&self, user_id: &str, node_id: &str) -> Result<Value> {
        let node = self.get_node(user_id, node_id).await?;
        let result = self
            .run_command(
                user_id,
                node_id,
                OVERVIEW_COMMAND,
                None,
                "system",
                None,
                "monitor",
                None,
            )
            .await?;
        let raw_output = result
            .data
            .and_then(|data| data.get("output").and_then(|o| o.as_str()).map(str::to_string))
            .unwrap_or_default();

        let parsed = parse_overview_output(&raw_output);
        let metrics = build_overview_metrics(&parsed);
        let status = if metrics.iter().any(|metric| metric.level == "critical") {
            "critical"
        } else if metrics.iter().any(|metric| metric.level == "warn") {
            "warning"
        } else {
            "healthy"
        };
        let summary = match status {
            "healthy" => "System is healthy; key metrics are within safe ranges.",
            "warning" => "System shows resource pressure worth watching; keep observing or tune.",
            _ => "System is under heavy resource pressure; investigate as soon as possible.",
        };

        Ok(serde_json::json!({
            "node_id": node.id,
            "node_name": node.name,
            "checked_at": Utc::now(),
            "status": status,
            "summary": summary,
            "hostname": parsed.get("HOSTNAME"),
            "os_name": parsed.get("OS_NAME"),
            "kernel": parsed.get("KERNEL"),
            "uptime": parsed.get("UPTIME"),
            "load_average": parsed.get("LOAD_AVG"),
            "memory_total": format_kb(to_int(parsed.get("MEM_TOTAL_KB"))),
            "memory_used": format_kb(memory_used_kb(&parsed)),
            "memory_free": format_kb(to_int(parsed.get("MEM_AVAILABLE_KB"))),
            "disk_total": format_kb(disk_total_kb(&parsed)),
            "disk_used": format_kb(disk_used_kb(&parsed)),
            "disk_use_percent": disk_percent(&parsed),
            "metrics": metrics,
            "raw_output": raw_output,
        }))
    }

    pub async fn list_logs(
        &self,
        user_id: &str,
        node_id: &str,
        limit: i64,
    ) -> Result<Vec<SshOperationLog>> {
        self.get_node(user_id, node_id).await?;
        self.nodes.list_logs(node_id, limit.min(MAX_LOG_LIMIT)).await
    }

    // ── approvals ────────────────────────────────────────────────────────

    pub async fn create_approval(
        &self,
        user_id: &str,
        session_id: &str,
        node_id: &str,
        command: &str,
        tool_call_id: Option<String>,
    ) -> Result<SshCommandApproval> {
        let node = self.get_node(user_id, node_id).await?;
        let approval = SshCommandApproval::new(session_id, &node.id, command, tool_call_id);
        self.nodes.create_approval(&approval).await?;
        Ok(approval)
    }

    pub async fn list_pending_approvals(
        &self,
        session_id: &str,
    ) -> Result<Vec<SshCommandApproval>> {
        self.nodes.list_pending_approvals(session_id).await
    }

    /// AI-issued command: gated behind an approval when the node demands it
    pub async fn execute_ai_command(
        &self,
        user_id: &str,
        session_id: &str,
        node_id: &str,
        command: &str,
        tool_call_id: Option<String>,
    ) -> Result<ToolResult> {
        let node = self.get_node(user_id, node_id).await?;
        if node.ssh_require_approval {
            let approval = self
                .create_approval(user_id, session_id, node_id, command, tool_call_id)
                .await?;
            return Ok(ToolResult {
                success: false,
                message: "approval_required".to_string(),
                data: Some(serde_json::json!({
                    "approval_required": true,
                    "approval_id": approval.id,
                    "node_id": node.id,
                    "node_name": node.name,
                    "command": command,
                })),
            });
        }

        self.run_command(
            user_id,
            node_id,
            command,
            None,
            "assistant",
            Some("agent"),
            "ai",
            Some(session_id),
        )
        .await
    }

    /// Resolve a pending approval. Repeated decisions are idempotent and
    /// answer `already_<state>`. Either path writes a user-role message into
    /// the session so the agent's memory stays coherent on its next turn.
    pub async fn decide_approval(
        &self,
        user_id: &str,
        approval_id: &str,
        approve: bool,
        reject_reason: Option<&str>,
    ) -> Result<ToolResult> {
        let approval = self
            .nodes
            .get_approval(approval_id)
            .await?
            .ok_or_else(|| Error::NotFound("Approval record not found".into()))?;
        let node = self.get_node(user_id, &approval.node_id).await?;

        if approval.status != SshApprovalStatus::Pending {
            return Ok(ToolResult {
                success: false,
                message: format!("already_{}", approval.status.as_str()),
                data: Some(serde_json::json!({
                    "approval_id": approval_id,
                    "status": approval.status.as_str(),
                })),
            });
        }

        if !approve {
            self.nodes
                .update_approval(approval_id, SshApprovalStatus::Rejected, reject_reason)
                .await?;
            let message = AgentEvent::user_message(
                format!(
                    "SSH command approval rejected for node [{}]. Command: {}. Reason: {}",
                    node.name,
                    approval.command,
                    reject_reason.unwrap_or("No reason provided"),
                ),
                None,
            );
            self.sessions
                .add_event(&approval.session_id, &message)
                .await?;
            return Ok(ToolResult {
                success: true,
                message: "rejected".to_string(),
                data: Some(serde_json::json!({
                    "approval_id": approval_id,
                    "status": SshApprovalStatus::Rejected.as_str(),
                })),
            });
        }

        self.nodes
            .update_approval(approval_id, SshApprovalStatus::Approved, None)
            .await?;
        let run_result = self
            .run_command(
                user_id,
                &approval.node_id,
                &approval.command,
                None,
                "assistant",
                Some("agent"),
                "approval",
                Some(&approval.session_id),
            )
            .await?;

        let output = run_result
            .data
            .as_ref()
            .and_then(|data| data.get("output").and_then(|o| o.as_str()))
            .unwrap_or_default()
            .to_string();
        let message = AgentEvent::user_message(
            format!(
                "SSH command approved and executed on node [{}]. Command: {}. Output:\n{}",
                node.name,
                approval.command,
                truncate(&output, TAKEOVER_OUTPUT_CAP),
            ),
            None,
        );
        self.sessions
            .add_event(&approval.session_id, &message)
            .await?;

        Ok(ToolResult {
            success: run_result.success,
            message: "approved".to_string(),
            data: Some(serde_json::json!({
                "approval_id": approval_id,
                "status": SshApprovalStatus::Approved.as_str(),
                "output": output,
            })),
        })
    }

    /// Record a user's direct command into the session history so the agent
    /// sees the takeover on its next turn.
    pub async fn append_takeover_message(
        &self,
        session_id: &str,
        node_id: &str,
        command: &str,
        output: &str,
    ) -> Result<()> {
        let node_name = self
            .nodes
            .get_node(node_id, None)
            .await?
            .map(|node| node.name)
            .unwrap_or_else(|| node_id.to_string());
        let message = AgentEvent::user_message(
            format!(
                "User takeover executed command on node [{node_name}]. Command: {command}. \
                 Output:\n{}",
                truncate(output, TAKEOVER_OUTPUT_CAP),
            ),
            None,
        );
        self.sessions.add_event(session_id, &message).await
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ── overview parsing ─────────────────────────────────────────────────────

pub(crate) fn parse_overview_output(raw: &str) -> std::collections::HashMap<String, String> {
    let mut parsed = std::collections::HashMap::new();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !key.is_empty() {
            parsed.insert(key.to_string(), value.trim().to_string());
        }
    }
    parsed
}

fn to_int(value: Option<&String>) -> Option<i64> {
    let digits: String = value?
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn disk_field(parsed: &std::collections::HashMap<String, String>, index: usize) -> Option<i64> {
    let root_disk = parsed.get("ROOT_DISK")?;
    let parts: Vec<&str> = root_disk.split_whitespace().collect();
    to_int(Some(&parts.get(index)?.to_string()))
}

fn disk_total_kb(parsed: &std::collections::HashMap<String, String>) -> Option<i64> {
    disk_field(parsed, 0)
}

fn disk_used_kb(parsed: &std::collections::HashMap<String, String>) -> Option<i64> {
    disk_field(parsed, 1)
}

fn disk_percent(parsed: &std::collections::HashMap<String, String>) -> Option<i64> {
    disk_field(parsed, 2)
}

fn memory_used_kb(parsed: &std::collections::HashMap<String, String>) -> Option<i64> {
    let total = to_int(parsed.get("MEM_TOTAL_KB"))?;
    let available = to_int(parsed.get("MEM_AVAILABLE_KB"))?;
    let used = total - available;
    (used >= 0).then_some(used)
}

fn format_kb(value: Option<i64>) -> Option<String> {
    let value = value?;
    let mut size = value as f64 * 1024.0;
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut unit = 0;
    while size >= 1024.0 && unit < units.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        Some(format!("{}{}", size as i64, units[unit]))
    } else {
        Some(format!("{size:.1}{}", units[unit]))
    }
}

pub(crate) fn build_overview_metrics(
    parsed: &std::collections::HashMap<String, String>,
) -> Vec<OverviewMetric> {
    let mut metrics = Vec::new();

    let load_avg = parsed
        .get("LOAD_AVG")
        .cloned()
        .unwrap_or_else(|| "-".to_string());
    let load_level = match load_avg
        .split_whitespace()
        .next()
        .and_then(|first| first.parse::<f64>().ok())
    {
        Some(load) if load >= 4.0 => "critical",
        Some(load) if load >= 2.0 => "warn",
        Some(_) => "ok",
        None => "warn",
    };
    metrics.push(OverviewMetric {
        label: "CPU load".into(),
        value: load_avg,
        hint: "1m / 5m / 15m".into(),
        level: load_level.into(),
    });

    let total_mem = to_int(parsed.get("MEM_TOTAL_KB"));
    let used_mem = memory_used_kb(parsed);
    let mem_percent = match (total_mem, used_mem) {
        (Some(total), Some(used)) if total > 0 => Some(used * 100 / total),
        _ => None,
    };
    let mem_level = match mem_percent {
        Some(percent) if percent >= 90 => "critical",
        Some(percent) if percent >= 75 => "warn",
        _ => "ok",
    };
    metrics.push(OverviewMetric {
        label: "Memory usage".into(),
        value: mem_percent
            .map(|percent| format!("{percent}%"))
            .unwrap_or_else(|| "-".into()),
        hint: format!(
            "{} / {}",
            format_kb(used_mem).unwrap_or_else(|| "-".into()),
            format_kb(total_mem).unwrap_or_else(|| "-".into()),
        ),
        level: mem_level.into(),
    });

    let disk = disk_percent(parsed);
    let disk_level = match disk {
        Some(percent) if percent >= 90 => "critical",
        Some(percent) if percent >= 75 => "warn",
        _ => "ok",
    };
    metrics.push(OverviewMetric {
        label: "Disk usage (/)".into(),
        value: disk
            .map(|percent| format!("{percent}%"))
            .unwrap_or_else(|| "-".into()),
        hint: format!(
            "{} / {}",
            format_kb(disk_used_kb(parsed)).unwrap_or_else(|| "-".into()),
            format_kb(disk_total_kb(parsed)).unwrap_or_else(|| "-".into()),
        ),
        level: disk_level.into(),
    });

    metrics.push(OverviewMetric {
        label: "Uptime".into(),
        value: parsed
            .get("UPTIME")
            .cloned()
            .unwrap_or_else(|| "-".into()),
        hint: "Since the last boot".into(),
        level: "ok".into(),
    });

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> String {
        [
            "HOSTNAME=web-01",
            "OS_NAME=Ubuntu 22.04.4 LTS",
            "KERNEL=5.15.0-105-generic",
            "UPTIME=up 3 days, 4 hours",
            "LOAD_AVG=0.52 0.61 0.55",
            "MEM_TOTAL_KB=16384000",
            "MEM_AVAILABLE_KB=8192000",
            "ROOT_DISK=102400000 51200000 50%",
            "not a key value line",
        ]
        .join("\n")
    }

    #[test]
    fn test_parse_overview_output() {
        let parsed = parse_overview_output(&sample_output());
        assert_eq!(parsed["HOSTNAME"], "web-01");
        assert_eq!(parsed["LOAD_AVG"], "0.52 0.61 0.55");
        assert!(!parsed.contains_key("not a key value line"));
    }

    #[test]
    fn test_metrics_healthy() {
        let parsed = parse_overview_output(&sample_output());
        let metrics = build_overview_metrics(&parsed);
        assert!(metrics.iter().all(|metric| metric.level == "ok"));
        assert_eq!(metrics.len(), 4);
    }

    #[test]
    fn test_metrics_thresholds() {
        let mut parsed = parse_overview_output(&sample_output());
        parsed.insert("LOAD_AVG".into(), "4.2 3.0 2.5".into());
        let metrics = build_overview_metrics(&parsed);
        assert_eq!(metrics[0].level, "critical");

        parsed.insert("LOAD_AVG".into(), "2.5 2.0 1.5".into());
        let metrics = build_overview_metrics(&parsed);
        assert_eq!(metrics[0].level, "warn");

        // 90% memory used
        parsed.insert("MEM_TOTAL_KB".into(), "1000000".into());
        parsed.insert("MEM_AVAILABLE_KB".into(), "100000".into());
        let metrics = build_overview_metrics(&parsed);
        assert_eq!(metrics[1].level, "critical");

        parsed.insert("ROOT_DISK".into(), "100 80 80%".into());
        let metrics = build_overview_metrics(&parsed);
        assert_eq!(metrics[2].level, "warn");
    }

    #[test]
    fn test_unparseable_load_is_warn() {
        let mut parsed = parse_overview_output(&sample_output());
        parsed.insert("LOAD_AVG".into(), "garbage".into());
        let metrics = build_overview_metrics(&parsed);
        assert_eq!(metrics[0].level, "warn");
    }

    #[test]
    fn test_format_kb() {
        assert_eq!(format_kb(Some(512)).unwrap(), "512.0KB");
        assert_eq!(format_kb(Some(16384000)).unwrap(), "15.6GB");
        assert!(format_kb(None).is_none());
    }
}
