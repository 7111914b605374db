//! Session store
//!
//! Sessions persist their event and file sequences as JSON arrays. Events
//! must be durable before they are handed to a client, so `add_event` writes
//! through before the caller yields.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{parse_ts, parse_ts_or_now};
use crate::error::{Error, Result};
use crate::models::{AgentEvent, FileInfo, Session, SessionStatus, SessionType};

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, user_id, sandbox_id, agent_id, task_id, title,
                unread_message_count, latest_message, latest_message_at,
                created_at, updated_at, events_json, files_json, status,
                session_type, is_shared
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                sandbox_id = excluded.sandbox_id,
                agent_id = excluded.agent_id,
                task_id = excluded.task_id,
                title = excluded.title,
                unread_message_count = excluded.unread_message_count,
                latest_message = excluded.latest_message,
                latest_message_at = excluded.latest_message_at,
                updated_at = excluded.updated_at,
                events_json = excluded.events_json,
                files_json = excluded.files_json,
                status = excluded.status,
                session_type = excluded.session_type,
                is_shared = excluded.is_shared
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.sandbox_id)
        .bind(&session.agent_id)
        .bind(&session.task_id)
        .bind(&session.title)
        .bind(session.unread_message_count)
        .bind(&session.latest_message)
        .bind(session.latest_message_at.map(|ts| ts.to_rfc3339()))
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(serde_json::to_string(&session.events)?)
        .bind(serde_json::to_string(&session.files)?)
        .bind(session.status.as_str())
        .bind(session.session_type.as_str())
        .bind(session.is_shared as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_session(row: &SqliteRow) -> Result<Session> {
        let events: Vec<AgentEvent> = serde_json::from_str(&row.get::<String, _>("events_json"))?;
        let files: Vec<FileInfo> = serde_json::from_str(&row.get::<String, _>("files_json"))?;
        let status: SessionStatus =
            serde_json::from_value(serde_json::Value::String(row.get("status")))
                .unwrap_or_default();
        let session_type: SessionType =
            serde_json::from_value(serde_json::Value::String(row.get("session_type")))
                .unwrap_or_default();

        Ok(Session {
            id: row.get("session_id"),
            user_id: row.get("user_id"),
            sandbox_id: row.get("sandbox_id"),
            agent_id: row.get("agent_id"),
            task_id: row.get("task_id"),
            title: row.get("title"),
            unread_message_count: row.get("unread_message_count"),
            latest_message: row.get("latest_message"),
            latest_message_at: parse_ts(row.get("latest_message_at")),
            created_at: parse_ts_or_now(row.get("created_at")),
            updated_at: parse_ts_or_now(row.get("updated_at")),
            events,
            files,
            status,
            session_type,
            is_shared: row.get::<i64, _>("is_shared") != 0,
        })
    }

    pub async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::row_to_session(&row)).transpose()
    }

    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Session>> {
        let rows =
            sqlx::query("SELECT * FROM sessions WHERE user_id = ? ORDER BY latest_message_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::row_to_session).collect()
    }

    /// Ownership-scoped lookup. A session owned by another user reads as
    /// absent; the caller decides how to surface that.
    pub async fn find_by_id_and_user_id(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::row_to_session(&row)).transpose()
    }

    pub async fn get_all(&self, session_type: Option<SessionType>) -> Result<Vec<Session>> {
        let rows = match session_type {
            Some(kind) => {
                sqlx::query(
                    "SELECT * FROM sessions WHERE session_type = ? ORDER BY latest_message_at DESC",
                )
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM sessions ORDER BY latest_message_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_session).collect()
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_or_err(&self, session_id: &str) -> Result<Session> {
        self.find_by_id(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Session {session_id} not found")))
    }

    pub async fn update_title(&self, session_id: &str, title: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET title = ?, updated_at = ? WHERE session_id = ?")
            .bind(title)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_latest_message(
        &self,
        session_id: &str,
        message: &str,
        timestamp: chrono::DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET latest_message = ?, latest_message_at = ?, updated_at = ? \
             WHERE session_id = ?",
        )
        .bind(message)
        .bind(timestamp.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE session_id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_shared_status(&self, session_id: &str, is_shared: bool) -> Result<()> {
        sqlx::query("UPDATE sessions SET is_shared = ?, updated_at = ? WHERE session_id = ?")
            .bind(is_shared as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append one event to the session's history
    pub async fn add_event(&self, session_id: &str, event: &AgentEvent) -> Result<()> {
        let mut session = self.load_or_err(session_id).await?;
        session.events.push(event.clone());
        session.updated_at = Utc::now();
        self.save(&session).await
    }

    pub async fn add_file(&self, session_id: &str, file_info: &FileInfo) -> Result<()> {
        let mut session = self.load_or_err(session_id).await?;
        session.files.push(file_info.clone());
        session.updated_at = Utc::now();
        self.save(&session).await
    }

    pub async fn remove_file(&self, session_id: &str, file_id: &str) -> Result<()> {
        let mut session = self.load_or_err(session_id).await?;
        session.files.retain(|file| file.file_id != file_id);
        session.updated_at = Utc::now();
        self.save(&session).await
    }

    pub async fn get_file_by_path(
        &self,
        session_id: &str,
        file_path: &str,
    ) -> Result<Option<FileInfo>> {
        let session = self.load_or_err(session_id).await?;
        Ok(session
            .files
            .into_iter()
            .find(|file| file.file_path.as_deref() == Some(file_path)))
    }

    pub async fn update_unread_message_count(&self, session_id: &str, count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET unread_message_count = ?, updated_at = ? WHERE session_id = ?",
        )
        .bind(count)
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomic with respect to concurrent increments on the same session
    pub async fn increment_unread_message_count(&self, session_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET unread_message_count = unread_message_count + 1, \
             updated_at = ? WHERE session_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn decrement_unread_message_count(&self, session_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET unread_message_count = unread_message_count - 1, \
             updated_at = ? WHERE session_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
