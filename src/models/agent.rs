//! Agent persona and rolling memory

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

/// Conversation history for one named role (planner / execution)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Memory {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// The LLM persona owned by one session.
///
/// Memories are keyed by agent role name and mutated by the planner and
/// executor while a flow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub memories: HashMap<String, Memory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(model_name: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        let now = Utc::now();
        Self {
            id: super::short_id(),
            model_name: model_name.into(),
            temperature,
            max_tokens,
            memories: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn memory_mut(&mut self, name: &str) -> &mut Memory {
        self.memories.entry(name.to_string()).or_default()
    }
}
