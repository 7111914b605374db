//! Agent event protocol
//!
//! Defines the typed events flowing from the task runner to clients. Every
//! event is appended to the session record and to the task's output stream;
//! the stream-assigned ID becomes the event's `id`, so clients can deduplicate
//! and resume from a cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::file::FileInfo;
use super::plan::{Plan, Step};
use super::search::SearchResultItem;
use crate::tools::ToolResult;

/// Identity shared by all event variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl Default for EventMeta {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Plan lifecycle markers carried by plan events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanEventStatus {
    Created,
    Updated,
    Completed,
}

/// Step lifecycle markers carried by step events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepEventStatus {
    Started,
    Failed,
    Completed,
}

/// Tool invocation phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Calling,
    Called,
}

/// Author of a message event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    #[default]
    Assistant,
}

/// Tool-specific payload attached to a `Called` tool event by the task
/// runner's enrichment pass.
///
/// Untagged on the wire; variant order matters because later variants have
/// weaker shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolContent {
    Browser {
        /// Storage file id of the post-action screenshot
        screenshot: String,
    },
    Search {
        results: Vec<SearchResultItem>,
    },
    Shell {
        console: Value,
    },
    File {
        content: String,
    },
    Ssh {
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        node_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        approval_required: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        approval_id: Option<String>,
    },
    Mcp {
        result: Value,
    },
}

/// Events emitted while an agent processes a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Message {
        #[serde(flatten)]
        meta: EventMeta,
        #[serde(default)]
        role: MessageRole,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attachments: Option<Vec<FileInfo>>,
    },
    Plan {
        #[serde(flatten)]
        meta: EventMeta,
        plan: Plan,
        status: PlanEventStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<Step>,
    },
    Step {
        #[serde(flatten)]
        meta: EventMeta,
        step: Step,
        status: StepEventStatus,
    },
    Tool {
        #[serde(flatten)]
        meta: EventMeta,
        tool_call_id: String,
        tool_name: String,
        function_name: String,
        function_args: Value,
        status: ToolStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        function_result: Option<ToolResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_content: Option<ToolContent>,
    },
    Title {
        #[serde(flatten)]
        meta: EventMeta,
        title: String,
    },
    Error {
        #[serde(flatten)]
        meta: EventMeta,
        error: String,
    },
    Done {
        #[serde(flatten)]
        meta: EventMeta,
    },
    Wait {
        #[serde(flatten)]
        meta: EventMeta,
    },
}

impl AgentEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            AgentEvent::Message { meta, .. }
            | AgentEvent::Plan { meta, .. }
            | AgentEvent::Step { meta, .. }
            | AgentEvent::Tool { meta, .. }
            | AgentEvent::Title { meta, .. }
            | AgentEvent::Error { meta, .. }
            | AgentEvent::Done { meta }
            | AgentEvent::Wait { meta } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut EventMeta {
        match self {
            AgentEvent::Message { meta, .. }
            | AgentEvent::Plan { meta, .. }
            | AgentEvent::Step { meta, .. }
            | AgentEvent::Tool { meta, .. }
            | AgentEvent::Title { meta, .. }
            | AgentEvent::Error { meta, .. }
            | AgentEvent::Done { meta }
            | AgentEvent::Wait { meta } => meta,
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.meta_mut().id = id.into();
    }

    /// True for the events that terminate a client stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::Done { .. } | AgentEvent::Error { .. } | AgentEvent::Wait { .. }
        )
    }

    pub fn message(message: impl Into<String>) -> Self {
        AgentEvent::Message {
            meta: EventMeta::default(),
            role: MessageRole::Assistant,
            message: message.into(),
            attachments: None,
        }
    }

    pub fn user_message(message: impl Into<String>, attachments: Option<Vec<FileInfo>>) -> Self {
        AgentEvent::Message {
            meta: EventMeta::default(),
            role: MessageRole::User,
            message: message.into(),
            attachments,
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        AgentEvent::Title {
            meta: EventMeta::default(),
            title: title.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        AgentEvent::Error {
            meta: EventMeta::default(),
            error: error.into(),
        }
    }

    pub fn done() -> Self {
        AgentEvent::Done {
            meta: EventMeta::default(),
        }
    }

    pub fn wait() -> Self {
        AgentEvent::Wait {
            meta: EventMeta::default(),
        }
    }

    pub fn plan(plan: Plan, status: PlanEventStatus) -> Self {
        AgentEvent::Plan {
            meta: EventMeta::default(),
            plan,
            status,
            step: None,
        }
    }

    pub fn step(step: Step, status: StepEventStatus) -> Self {
        AgentEvent::Step {
            meta: EventMeta::default(),
            step,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = AgentEvent::message("hello");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"message"#));
        assert!(json.contains(r#""role":"assistant"#));

        let done = AgentEvent::done();
        assert!(serde_json::to_string(&done).unwrap().contains(r#""type":"done"#));
    }

    #[test]
    fn test_event_round_trip() {
        let mut event = AgentEvent::title("Investigate disk usage");
        event.set_id("1700000000000-0");
        let json = serde_json::to_string(&event).unwrap();
        let parsed: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.meta().id, "1700000000000-0");
        match parsed {
            AgentEvent::Title { title, .. } => assert_eq!(title, "Investigate disk usage"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_tool_content_untagged_round_trip() {
        let content = ToolContent::Ssh {
            node_id: Some("n1".into()),
            node_name: Some("web-01".into()),
            command: Some("uptime".into()),
            output: None,
            success: None,
            approval_required: true,
            approval_id: Some("a1".into()),
        };
        let json = serde_json::to_value(&content).unwrap();
        let parsed: ToolContent = serde_json::from_value(json).unwrap();
        match parsed {
            ToolContent::Ssh {
                approval_required, ..
            } => assert!(approval_required),
            other => panic!("unexpected variant: {other:?}"),
        }

        let file = serde_json::json!({"content": "line one"});
        match serde_json::from_value::<ToolContent>(file).unwrap() {
            ToolContent::File { content } => assert_eq!(content, "line one"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(AgentEvent::done().is_terminal());
        assert!(AgentEvent::wait().is_terminal());
        assert!(AgentEvent::error("x").is_terminal());
        assert!(!AgentEvent::message("x").is_terminal());
    }
}
