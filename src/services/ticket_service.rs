//! Ticket service
//!
//! Creates ticket+session pairs and drives the agent asynchronously with a
//! prompt composed from the ticket. Dispatch failures roll the ticket to
//! waiting-user with a system comment instead of surfacing to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use serde::Deserialize;

use super::AgentService;
use crate::error::{Error, Result};
use crate::models::{
    SessionType, Ticket, TicketComment, TicketCommentRole, TicketEvent, TicketEventType,
    TicketPriority, TicketStatus, TicketUrgency,
};
use crate::store::TicketStore;

/// Ticket fields accepted from the API
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TicketPayload {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub plugin_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub priority: Option<TicketPriority>,
    pub urgency: Option<TicketUrgency>,
    pub estimated_minutes: Option<i64>,
    pub sla_hours: Option<i64>,
}

pub struct TicketService {
    tickets: TicketStore,
    agent_service: Arc<AgentService>,
}

impl TicketService {
    pub fn new(tickets: TicketStore, agent_service: Arc<AgentService>) -> Self {
        Self {
            tickets,
            agent_service,
        }
    }

    /// Create the ticket and its backing session, then hand the composed
    /// prompt to the agent without blocking the caller.
    pub async fn create_ticket(
        self: Arc<Self>,
        user_id: &str,
        payload: TicketPayload,
    ) -> Result<Ticket> {
        let title = payload.title.trim().to_string();
        let description = payload.description.trim().to_string();
        if title.is_empty() {
            return Err(Error::BadRequest("Ticket title is required".into()));
        }
        if description.is_empty() {
            return Err(Error::BadRequest("Ticket description is required".into()));
        }

        let session = self
            .agent_service
            .create_session(user_id, SessionType::Ticket)
            .await?;
        let now = Utc::now();

        let mut ticket = Ticket::new(user_id, title, description, &session.id);
        ticket.node_ids = payload.node_ids;
        ticket.plugin_ids = payload.plugin_ids;
        ticket.tags = payload
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        if let Some(priority) = payload.priority {
            ticket.priority = priority;
        }
        if let Some(urgency) = payload.urgency {
            ticket.urgency = urgency;
        }
        ticket.estimated_minutes = payload.estimated_minutes;
        ticket.sla_due_at = payload.sla_hours.map(|hours| now + Duration::hours(hours));
        ticket.comments.push(TicketComment::new(
            TicketCommentRole::System,
            "Ticket created and assigned to AI",
        ));
        ticket
            .events
            .push(TicketEvent::new(TicketEventType::Created, "Ticket created"));
        ticket.events.push(TicketEvent::new(
            TicketEventType::LinkedSession,
            format!("Linked to backend session {}", session.id),
        ));
        self.tickets.save(&ticket).await?;

        let service = self.clone();
        let dispatch_ticket = ticket.clone();
        let dispatch_user = user_id.to_string();
        tokio::spawn(async move {
            service
                .dispatch_to_ai(
                    &dispatch_ticket,
                    &dispatch_user,
                    build_dispatch_prompt(&dispatch_ticket),
                    TicketStatus::Processing,
                )
                .await;
        });

        Ok(ticket)
    }

    pub async fn list_tickets(&self, user_id: &str) -> Result<Vec<Ticket>> {
        self.tickets.list_by_user_id(user_id).await
    }

    pub async fn get_ticket(&self, ticket_id: &str, user_id: &str) -> Result<Ticket> {
        self.tickets
            .find_by_id_and_user_id(ticket_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound("Ticket not found".into()))
    }

    pub async fn get_ticket_by_session(&self, session_id: &str) -> Result<Option<Ticket>> {
        self.tickets.find_by_session_id(session_id).await
    }

    /// User reply: recorded on the ticket and re-dispatched to the agent
    pub async fn reply_ticket(
        self: Arc<Self>,
        ticket_id: &str,
        user_id: &str,
        message: &str,
    ) -> Result<Ticket> {
        let mut ticket = self.get_ticket(ticket_id, user_id).await?;
        let clean_message = message.trim().to_string();
        if clean_message.is_empty() {
            return Err(Error::BadRequest("Reply message is required".into()));
        }

        ticket
            .comments
            .push(TicketComment::new(TicketCommentRole::User, &clean_message));
        ticket.events.push(TicketEvent::new(
            TicketEventType::UserReplied,
            "User added a reply",
        ));
        ticket.status = TicketStatus::Processing;
        ticket.updated_at = Utc::now();
        self.tickets.save(&ticket).await?;

        let service = self.clone();
        let dispatch_ticket = ticket.clone();
        let dispatch_user = user_id.to_string();
        tokio::spawn(async move {
            let prompt = format!(
                "Ticket {} has an update from user. Please check and continue processing.\n\n\
                 User reply:\n{}",
                dispatch_ticket.id, clean_message,
            );
            service
                .dispatch_to_ai(&dispatch_ticket, &dispatch_user, prompt, TicketStatus::Processing)
                .await;
        });

        Ok(ticket)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_ticket(
        &self,
        ticket_id: &str,
        user_id: &str,
        status: Option<TicketStatus>,
        priority: Option<TicketPriority>,
        urgency: Option<TicketUrgency>,
        tags: Option<Vec<String>>,
        estimated_minutes: Option<i64>,
        spent_minutes: Option<i64>,
        sla_due_at: Option<DateTime<Utc>>,
    ) -> Result<Ticket> {
        let mut ticket = self.get_ticket(ticket_id, user_id).await?;

        if let Some(status) = status {
            if status != ticket.status {
                ticket.transition_status(status);
            }
        }
        if let Some(priority) = priority {
            ticket.priority = priority;
        }
        if let Some(urgency) = urgency {
            ticket.urgency = urgency;
        }
        if let Some(tags) = tags {
            ticket.tags = tags
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect();
        }
        if let Some(minutes) = estimated_minutes {
            ticket.estimated_minutes = Some(minutes.max(0));
        }
        if let Some(minutes) = spent_minutes {
            ticket.spent_minutes = minutes.max(0);
        }
        if let Some(due) = sla_due_at {
            ticket.sla_due_at = Some(due);
        }

        ticket.updated_at = Utc::now();
        self.tickets.save(&ticket).await?;
        Ok(ticket)
    }

    /// Mark the dispatch, then drain the agent's chat stream. On failure the
    /// ticket rolls to waiting-user with a system comment.
    async fn dispatch_to_ai(
        &self,
        ticket: &Ticket,
        user_id: &str,
        message: String,
        next_status: TicketStatus,
    ) {
        let latest = match self.tickets.find_by_id(&ticket.id).await {
            Ok(Some(latest)) => latest,
            _ => return,
        };
        let mut latest = latest;
        latest.status = next_status;
        latest.events.push(TicketEvent::new(
            TicketEventType::AutoDispatched,
            "Dispatched to AI",
        ));
        latest.updated_at = Utc::now();
        if let Err(err) = self.tickets.save(&latest).await {
            tracing::error!(ticket_id = %ticket.id, error = %err, "Ticket dispatch save failed");
            return;
        }

        let mut failure: Option<String> = None;
        {
            let mut events = self.agent_service.clone().chat(
                ticket.session_id.clone(),
                user_id.to_string(),
                Some(message),
                Some(Utc::now()),
                None,
                Vec::new(),
            );
            while let Some(event) = events.next().await {
                if let crate::models::AgentEvent::Error { error, .. } = &event {
                    failure = Some(error.clone());
                }
            }
        }

        if let Some(error) = failure {
            tracing::error!(ticket_id = %ticket.id, error = %error, "AI dispatch failed");
            if let Ok(Some(mut latest)) = self.tickets.find_by_id(&ticket.id).await {
                latest.status = TicketStatus::WaitingUser;
                latest.comments.push(TicketComment::new(
                    TicketCommentRole::System,
                    format!("AI dispatch failed: {error}"),
                ));
                latest.events.push(TicketEvent::new(
                    TicketEventType::AiResponded,
                    "AI dispatch failed",
                ));
                latest.updated_at = Utc::now();
                let _ = self.tickets.save(&latest).await;
            }
        }
    }
}

fn build_dispatch_prompt(ticket: &Ticket) -> String {
    let join_or_none = |items: &[String]| {
        if items.is_empty() {
            "(none)".to_string()
        } else {
            items.join(", ")
        }
    };
    format!(
        "Please check ticket [{}] and solve it.\n\n\
         Title: {}\n\
         Description: {}\n\
         Priority: {}\n\
         Urgency: {}\n\
         Tags: {}\n\
         Related nodes: {}\n\
         Related plugins: {}\n\n\
         You can use ticket tools to read/update/reply this ticket.",
        ticket.id,
        ticket.title,
        ticket.description,
        ticket.priority.as_str(),
        ticket.urgency.as_str(),
        join_or_none(&ticket.tags),
        join_or_none(&ticket.node_ids),
        join_or_none(&ticket.plugin_ids),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_prompt_contains_ticket_context() {
        let mut ticket = Ticket::new("u1", "Disk alert", "Root volume at 95%", "s1");
        ticket.tags = vec!["disk".into()];
        ticket.node_ids = vec!["n1".into(), "n2".into()];
        let prompt = build_dispatch_prompt(&ticket);
        assert!(prompt.contains(&ticket.id));
        assert!(prompt.contains("Disk alert"));
        assert!(prompt.contains("n1, n2"));
        assert!(prompt.contains("Related plugins: (none)"));
    }
}
