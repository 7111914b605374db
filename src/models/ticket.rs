//! Ticket models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Processing,
    WaitingUser,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Processing => "processing",
            TicketStatus::WaitingUser => "waiting_user",
            TicketStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::P0 => "p0",
            TicketPriority::P1 => "p1",
            TicketPriority::P2 => "p2",
            TicketPriority::P3 => "p3",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketUrgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TicketUrgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketUrgency::Low => "low",
            TicketUrgency::Medium => "medium",
            TicketUrgency::High => "high",
            TicketUrgency::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketCommentRole {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketEventType {
    Created,
    StatusChanged,
    CommentAdded,
    AutoDispatched,
    AiResponded,
    UserReplied,
    LinkedSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketComment {
    pub id: String,
    pub role: TicketCommentRole,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TicketComment {
    pub fn new(role: TicketCommentRole, message: impl Into<String>) -> Self {
        Self {
            id: super::tiny_id(),
            role,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub id: String,
    pub event_type: TicketEventType,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TicketEvent {
    pub fn new(event_type: TicketEventType, message: impl Into<String>) -> Self {
        Self {
            id: super::tiny_id(),
            event_type,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// An operations ticket bound one-to-one with an agent session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub urgency: TicketUrgency,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub plugin_ids: Vec<String>,
    pub session_id: String,
    #[serde(default)]
    pub comments: Vec<TicketComment>,
    #[serde(default)]
    pub events: Vec<TicketEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i64>,
    #[serde(default)]
    pub spent_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_due_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_response_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reopen_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: super::tiny_id(),
            user_id: user_id.into(),
            title: title.into(),
            description: description.into(),
            status: TicketStatus::Open,
            priority: TicketPriority::P2,
            urgency: TicketUrgency::Medium,
            tags: Vec::new(),
            node_ids: Vec::new(),
            plugin_ids: Vec::new(),
            session_id: session_id.into(),
            comments: Vec::new(),
            events: Vec::new(),
            estimated_minutes: None,
            spent_minutes: 0,
            sla_due_at: None,
            first_response_at: None,
            resolved_at: None,
            reopen_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status change, tracking reopen count and resolution time
    pub fn transition_status(&mut self, status: TicketStatus) {
        if self.status == TicketStatus::Resolved && status != TicketStatus::Resolved {
            self.reopen_count += 1;
        }
        self.status = status;
        if status == TicketStatus::Resolved {
            self.resolved_at = Some(Utc::now());
        }
        self.events.push(TicketEvent::new(
            TicketEventType::StatusChanged,
            format!("Status changed to {}", status.as_str()),
        ));
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reopen_count_increments_on_leaving_resolved() {
        let mut ticket = Ticket::new("u1", "disk full", "/", "s1");
        ticket.transition_status(TicketStatus::Resolved);
        assert!(ticket.resolved_at.is_some());
        assert_eq!(ticket.reopen_count, 0);

        ticket.transition_status(TicketStatus::Processing);
        assert_eq!(ticket.reopen_count, 1);

        ticket.transition_status(TicketStatus::Resolved);
        ticket.transition_status(TicketStatus::Resolved);
        assert_eq!(ticket.reopen_count, 1);
    }
}
