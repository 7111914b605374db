//! Server node, SSH log, and approval store

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{parse_ts, parse_ts_or_now};
use crate::error::Result;
use crate::models::{
    SshApprovalStatus, SshAuthType, SshCommandApproval, SshNode, SshOperationLog,
};

#[derive(Clone)]
pub struct NodeStore {
    pool: SqlitePool,
}

impl NodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ── nodes ────────────────────────────────────────────────────────────

    pub async fn save_node(&self, node: &SshNode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO server_nodes (
                node_id, user_id, name, description, remarks, ssh_enabled,
                ssh_host, ssh_port, ssh_username, ssh_auth_type, ssh_password,
                ssh_private_key, ssh_passphrase, ssh_require_approval,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(node_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                remarks = excluded.remarks,
                ssh_enabled = excluded.ssh_enabled,
                ssh_host = excluded.ssh_host,
                ssh_port = excluded.ssh_port,
                ssh_username = excluded.ssh_username,
                ssh_auth_type = excluded.ssh_auth_type,
                ssh_password = excluded.ssh_password,
                ssh_private_key = excluded.ssh_private_key,
                ssh_passphrase = excluded.ssh_passphrase,
                ssh_require_approval = excluded.ssh_require_approval,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&node.id)
        .bind(&node.user_id)
        .bind(&node.name)
        .bind(&node.description)
        .bind(&node.remarks)
        .bind(node.ssh_enabled as i64)
        .bind(&node.ssh_host)
        .bind(node.ssh_port as i64)
        .bind(&node.ssh_username)
        .bind(node.ssh_auth_type.as_str())
        .bind(&node.ssh_password)
        .bind(&node.ssh_private_key)
        .bind(&node.ssh_passphrase)
        .bind(node.ssh_require_approval as i64)
        .bind(node.created_at.to_rfc3339())
        .bind(node.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_node(row: &SqliteRow) -> SshNode {
        SshNode {
            id: row.get("node_id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
            description: row.get("description"),
            remarks: row.get("remarks"),
            ssh_enabled: row.get::<i64, _>("ssh_enabled") != 0,
            ssh_host: row.get("ssh_host"),
            ssh_port: row.get::<i64, _>("ssh_port") as u16,
            ssh_username: row.get("ssh_username"),
            ssh_auth_type: match row.get::<String, _>("ssh_auth_type").as_str() {
                "private_key" => SshAuthType::PrivateKey,
                _ => SshAuthType::Password,
            },
            ssh_password: row.get("ssh_password"),
            ssh_private_key: row.get("ssh_private_key"),
            ssh_passphrase: row.get("ssh_passphrase"),
            ssh_require_approval: row.get::<i64, _>("ssh_require_approval") != 0,
            created_at: parse_ts_or_now(row.get("created_at")),
            updated_at: parse_ts_or_now(row.get("updated_at")),
        }
    }

    pub async fn list_nodes(&self, user_id: &str) -> Result<Vec<SshNode>> {
        let rows =
            sqlx::query("SELECT * FROM server_nodes WHERE user_id = ? ORDER BY created_at ASC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(Self::row_to_node).collect())
    }

    pub async fn count_nodes(&self, user_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM server_nodes WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Ownership-scoped lookup when `user_id` is given
    pub async fn get_node(&self, node_id: &str, user_id: Option<&str>) -> Result<Option<SshNode>> {
        let row = match user_id {
            Some(user_id) => {
                sqlx::query("SELECT * FROM server_nodes WHERE node_id = ? AND user_id = ?")
                    .bind(node_id)
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM server_nodes WHERE node_id = ?")
                    .bind(node_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row.map(|row| Self::row_to_node(&row)))
    }

    pub async fn delete_node(&self, node_id: &str, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM server_nodes WHERE node_id = ? AND user_id = ?")
            .bind(node_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── operation logs ───────────────────────────────────────────────────

    pub async fn add_log(&self, log: &SshOperationLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ssh_operation_logs (
                log_id, session_id, node_id, actor_type, actor_id, source,
                command, output, success, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.session_id)
        .bind(&log.node_id)
        .bind(&log.actor_type)
        .bind(&log.actor_id)
        .bind(&log.source)
        .bind(&log.command)
        .bind(&log.output)
        .bind(log.success as i64)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_logs(&self, node_id: &str, limit: i64) -> Result<Vec<SshOperationLog>> {
        let rows = sqlx::query(
            "SELECT * FROM ssh_operation_logs WHERE node_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(node_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| SshOperationLog {
                id: row.get("log_id"),
                session_id: row.get("session_id"),
                node_id: row.get("node_id"),
                actor_type: row.get("actor_type"),
                actor_id: row.get("actor_id"),
                source: row.get("source"),
                command: row.get("command"),
                output: row.get("output"),
                success: row.get::<i64, _>("success") != 0,
                created_at: parse_ts_or_now(row.get("created_at")),
            })
            .collect())
    }

    // ── approvals ────────────────────────────────────────────────────────

    pub async fn create_approval(&self, approval: &SshCommandApproval) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ssh_command_approvals (
                approval_id, session_id, node_id, command, status,
                reject_reason, requested_by_tool_call_id, created_at, decided_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&approval.id)
        .bind(&approval.session_id)
        .bind(&approval.node_id)
        .bind(&approval.command)
        .bind(approval.status.as_str())
        .bind(&approval.reject_reason)
        .bind(&approval.requested_by_tool_call_id)
        .bind(approval.created_at.to_rfc3339())
        .bind(approval.decided_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_approval(row: &SqliteRow) -> SshCommandApproval {
        SshCommandApproval {
            id: row.get("approval_id"),
            session_id: row.get("session_id"),
            node_id: row.get("node_id"),
            command: row.get("command"),
            status: match row.get::<String, _>("status").as_str() {
                "approved" => SshApprovalStatus::Approved,
                "rejected" => SshApprovalStatus::Rejected,
                _ => SshApprovalStatus::Pending,
            },
            reject_reason: row.get("reject_reason"),
            requested_by_tool_call_id: row.get("requested_by_tool_call_id"),
            created_at: parse_ts_or_now(row.get("created_at")),
            decided_at: parse_ts(row.get("decided_at")),
        }
    }

    pub async fn get_approval(&self, approval_id: &str) -> Result<Option<SshCommandApproval>> {
        let row = sqlx::query("SELECT * FROM ssh_command_approvals WHERE approval_id = ?")
            .bind(approval_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Self::row_to_approval(&row)))
    }

    pub async fn list_pending_approvals(
        &self,
        session_id: &str,
    ) -> Result<Vec<SshCommandApproval>> {
        let rows = sqlx::query(
            "SELECT * FROM ssh_command_approvals \
             WHERE session_id = ? AND status = 'pending' ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_approval).collect())
    }

    pub async fn update_approval(
        &self,
        approval_id: &str,
        status: SshApprovalStatus,
        reject_reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE ssh_command_approvals \
             SET status = ?, reject_reason = ?, decided_at = ? WHERE approval_id = ?",
        )
        .bind(status.as_str())
        .bind(reject_reason)
        .bind(Utc::now().to_rfc3339())
        .bind(approval_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
