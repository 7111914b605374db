//! Server node, SSH operation log and command approval models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SshAuthType {
    #[default]
    Password,
    PrivateKey,
}

impl SshAuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SshAuthType::Password => "password",
            SshAuthType::PrivateKey => "private_key",
        }
    }
}

/// A registered server node reachable over SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshNode {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub ssh_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_host: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,
    #[serde(default)]
    pub ssh_auth_type: SshAuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_passphrase: Option<String>,
    #[serde(default)]
    pub ssh_require_approval: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_ssh_port() -> u16 {
    22
}

impl SshNode {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: super::short_id(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            remarks: None,
            ssh_enabled: false,
            ssh_host: None,
            ssh_port: default_ssh_port(),
            ssh_username: None,
            ssh_auth_type: SshAuthType::Password,
            ssh_password: None,
            ssh_private_key: None,
            ssh_passphrase: None,
            ssh_require_approval: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Audit record of one executed SSH command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshOperationLog {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub node_id: String,
    pub actor_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub source: String,
    pub command: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl SshOperationLog {
    pub fn new(node_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: super::short_id(),
            session_id: None,
            node_id: node_id.into(),
            actor_type: "user".into(),
            actor_id: None,
            source: "manual".into(),
            command: command.into(),
            output: String::new(),
            success: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SshApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl SshApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SshApprovalStatus::Pending => "pending",
            SshApprovalStatus::Approved => "approved",
            SshApprovalStatus::Rejected => "rejected",
        }
    }
}

/// An AI-issued SSH command awaiting a user decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshCommandApproval {
    pub id: String,
    pub session_id: String,
    pub node_id: String,
    pub command: String,
    #[serde(default)]
    pub status: SshApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by_tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl SshCommandApproval {
    pub fn new(
        session_id: impl Into<String>,
        node_id: impl Into<String>,
        command: impl Into<String>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self {
            id: super::short_id(),
            session_id: session_id.into(),
            node_id: node_id.into(),
            command: command.into(),
            status: SshApprovalStatus::Pending,
            reject_reason: None,
            requested_by_tool_call_id: tool_call_id,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}
