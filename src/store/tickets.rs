//! Ticket store

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{parse_ts, parse_ts_or_now};
use crate::error::Result;
use crate::models::{Ticket, TicketPriority, TicketStatus, TicketUrgency};

#[derive(Clone)]
pub struct TicketStore {
    pool: SqlitePool,
}

impl TicketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (
                ticket_id, user_id, title, description, status, priority,
                urgency, tags_json, node_ids_json, plugin_ids_json, session_id,
                comments_json, events_json, estimated_minutes, spent_minutes,
                sla_due_at, first_response_at, resolved_at, reopen_count,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                urgency = excluded.urgency,
                tags_json = excluded.tags_json,
                node_ids_json = excluded.node_ids_json,
                plugin_ids_json = excluded.plugin_ids_json,
                comments_json = excluded.comments_json,
                events_json = excluded.events_json,
                estimated_minutes = excluded.estimated_minutes,
                spent_minutes = excluded.spent_minutes,
                sla_due_at = excluded.sla_due_at,
                first_response_at = excluded.first_response_at,
                resolved_at = excluded.resolved_at,
                reopen_count = excluded.reopen_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.user_id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(ticket.urgency.as_str())
        .bind(serde_json::to_string(&ticket.tags)?)
        .bind(serde_json::to_string(&ticket.node_ids)?)
        .bind(serde_json::to_string(&ticket.plugin_ids)?)
        .bind(&ticket.session_id)
        .bind(serde_json::to_string(&ticket.comments)?)
        .bind(serde_json::to_string(&ticket.events)?)
        .bind(ticket.estimated_minutes)
        .bind(ticket.spent_minutes)
        .bind(ticket.sla_due_at.map(|ts| ts.to_rfc3339()))
        .bind(ticket.first_response_at.map(|ts| ts.to_rfc3339()))
        .bind(ticket.resolved_at.map(|ts| ts.to_rfc3339()))
        .bind(ticket.reopen_count)
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_ticket(row: &SqliteRow) -> Result<Ticket> {
        let parse_enum = |s: String| serde_json::Value::String(s);
        Ok(Ticket {
            id: row.get("ticket_id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            description: row.get("description"),
            status: serde_json::from_value::<TicketStatus>(parse_enum(row.get("status")))
                .unwrap_or_default(),
            priority: serde_json::from_value::<TicketPriority>(parse_enum(row.get("priority")))
                .unwrap_or_default(),
            urgency: serde_json::from_value::<TicketUrgency>(parse_enum(row.get("urgency")))
                .unwrap_or_default(),
            tags: serde_json::from_str(&row.get::<String, _>("tags_json"))?,
            node_ids: serde_json::from_str(&row.get::<String, _>("node_ids_json"))?,
            plugin_ids: serde_json::from_str(&row.get::<String, _>("plugin_ids_json"))?,
            session_id: row.get("session_id"),
            comments: serde_json::from_str(&row.get::<String, _>("comments_json"))?,
            events: serde_json::from_str(&row.get::<String, _>("events_json"))?,
            estimated_minutes: row.get("estimated_minutes"),
            spent_minutes: row.get("spent_minutes"),
            sla_due_at: parse_ts(row.get("sla_due_at")),
            first_response_at: parse_ts(row.get("first_response_at")),
            resolved_at: parse_ts(row.get("resolved_at")),
            reopen_count: row.get("reopen_count"),
            created_at: parse_ts_or_now(row.get("created_at")),
            updated_at: parse_ts_or_now(row.get("updated_at")),
        })
    }

    pub async fn find_by_id(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        let row = sqlx::query("SELECT * FROM tickets WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::row_to_ticket(&row)).transpose()
    }

    pub async fn find_by_id_and_user_id(
        &self,
        ticket_id: &str,
        user_id: &str,
    ) -> Result<Option<Ticket>> {
        let row = sqlx::query("SELECT * FROM tickets WHERE ticket_id = ? AND user_id = ?")
            .bind(ticket_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::row_to_ticket(&row)).transpose()
    }

    pub async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Ticket>> {
        let row = sqlx::query("SELECT * FROM tickets WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::row_to_ticket(&row)).transpose()
    }

    pub async fn list_by_user_id(&self, user_id: &str) -> Result<Vec<Ticket>> {
        let rows = sqlx::query("SELECT * FROM tickets WHERE user_id = ? ORDER BY updated_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_ticket).collect()
    }

    pub async fn delete(&self, ticket_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM tickets WHERE ticket_id = ?")
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
