//! User message handed to the flow

use serde::{Deserialize, Serialize};

/// One user turn: text plus sandbox paths of any synced attachments
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserMessage {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl UserMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachments: Vec::new(),
        }
    }
}
