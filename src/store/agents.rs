//! Agent store

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::parse_ts_or_now;
use crate::error::Result;
use crate::models::{Agent, Memory};

#[derive(Clone)]
pub struct AgentStore {
    pool: SqlitePool,
}

impl AgentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                agent_id, model_name, temperature, max_tokens, memories_json,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id) DO UPDATE SET
                model_name = excluded.model_name,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens,
                memories_json = excluded.memories_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.model_name)
        .bind(agent.temperature as f64)
        .bind(agent.max_tokens as i64)
        .bind(serde_json::to_string(&agent.memories)?)
        .bind(agent.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let memories: HashMap<String, Memory> =
            serde_json::from_str(&row.get::<String, _>("memories_json"))?;
        Ok(Some(Agent {
            id: row.get("agent_id"),
            model_name: row.get("model_name"),
            temperature: row.get::<f64, _>("temperature") as f32,
            max_tokens: row.get::<i64, _>("max_tokens") as u32,
            memories,
            created_at: parse_ts_or_now(row.get("created_at")),
            updated_at: parse_ts_or_now(row.get("updated_at")),
        }))
    }

    /// Replace one named memory slot
    pub async fn save_memory(&self, agent_id: &str, name: &str, memory: &Memory) -> Result<()> {
        let Some(mut agent) = self.find_by_id(agent_id).await? else {
            return Err(crate::error::Error::NotFound(format!(
                "Agent {agent_id} not found"
            )));
        };
        agent.memories.insert(name.to_string(), memory.clone());
        self.save(&agent).await
    }

    pub async fn get_memory(&self, agent_id: &str, name: &str) -> Result<Memory> {
        let agent = self.find_by_id(agent_id).await?;
        Ok(agent
            .and_then(|agent| agent.memories.get(name).cloned())
            .unwrap_or_default())
    }

    pub async fn delete(&self, agent_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM agents WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
