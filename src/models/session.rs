//! Session aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{AgentEvent, PlanEventStatus};
use super::file::FileInfo;
use super::plan::Plan;

/// Session lifecycle state.
///
/// `Running` holds exactly while a live task runner owns the session;
/// `Waiting` means the flow paused for user input or approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    Waiting,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Chat,
    Ticket,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Chat => "chat",
            SessionType::Ticket => "ticket",
        }
    }
}

/// One end-user conversation with an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub unread_message_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<AgentEvent>,
    #[serde(default)]
    pub files: Vec<FileInfo>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub session_type: SessionType,
    #[serde(default)]
    pub is_shared: bool,
}

impl Session {
    pub fn new(user_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: super::short_id(),
            user_id: user_id.into(),
            sandbox_id: None,
            agent_id: agent_id.into(),
            task_id: None,
            title: None,
            unread_message_count: 0,
            latest_message: None,
            latest_message_at: Some(now),
            created_at: now,
            updated_at: now,
            events: Vec::new(),
            files: Vec::new(),
            status: SessionStatus::Pending,
            session_type: SessionType::Chat,
            is_shared: false,
        }
    }

    /// Most recent plan carried by the event history, if any.
    ///
    /// A completed-plan marker wins over the created/updated event that
    /// preceded it because the scan runs backwards.
    pub fn last_plan(&self) -> Option<Plan> {
        self.events.iter().rev().find_map(|event| match event {
            AgentEvent::Plan { plan, .. } => Some(plan.clone()),
            _ => None,
        })
    }

    /// Whether the latest plan event marks the plan completed
    pub fn last_plan_status(&self) -> Option<PlanEventStatus> {
        self.events.iter().rev().find_map(|event| match event {
            AgentEvent::Plan { status, .. } => Some(*status),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::Plan;

    #[test]
    fn test_last_plan_scans_backwards() {
        let mut session = Session::new("u1", "a1");
        assert!(session.last_plan().is_none());

        let first = Plan {
            title: "first".into(),
            ..Default::default()
        };
        let second = Plan {
            title: "second".into(),
            ..Default::default()
        };
        session
            .events
            .push(AgentEvent::plan(first, PlanEventStatus::Created));
        session.events.push(AgentEvent::message("between"));
        session
            .events
            .push(AgentEvent::plan(second, PlanEventStatus::Updated));

        assert_eq!(session.last_plan().unwrap().title, "second");
        assert_eq!(
            session.last_plan_status().unwrap(),
            PlanEventStatus::Updated
        );
    }
}
