//! Ticket tool
//!
//! Lets the agent read and advance the ticket bound to its session.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{optional_str, require_str, Tool, ToolFunction, ToolResult};
use crate::models::{Ticket, TicketComment, TicketCommentRole, TicketEvent, TicketEventType, TicketStatus};
use crate::store::TicketStore;

pub struct TicketTool {
    store: TicketStore,
    session_id: String,
}

impl TicketTool {
    pub fn new(store: TicketStore, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    async fn resolve_ticket(&self, ticket_id: Option<&str>) -> Result<Ticket, ToolResult> {
        let ticket = match ticket_id {
            Some(id) => self.store.find_by_id(id).await,
            None => self.store.find_by_session_id(&self.session_id).await,
        };
        match ticket {
            Ok(Some(ticket)) => Ok(ticket),
            Ok(None) => Err(ToolResult::fail("No ticket bound to current session")),
            Err(err) => Err(ToolResult::fail(err.to_string())),
        }
    }
}

fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

#[async_trait]
impl Tool for TicketTool {
    fn name(&self) -> &str {
        "ticket"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![
            ToolFunction::new(
                "ticket_get",
                "Get current ticket details by ticket_id or current session ticket.",
                serde_json::json!({
                    "ticket_id": {
                        "type": "string",
                        "description": "Optional ticket id. If not given, uses current session ticket.",
                    },
                }),
                &[],
            ),
            ToolFunction::new(
                "ticket_update_status",
                "Update ticket status when progress changes.",
                serde_json::json!({
                    "status": {
                        "type": "string",
                        "enum": ["open", "processing", "waiting_user", "resolved"],
                        "description": "New ticket status",
                    },
                    "ticket_id": {
                        "type": "string",
                        "description": "Optional ticket id. If not provided, update current session ticket.",
                    },
                }),
                &["status"],
            ),
            ToolFunction::new(
                "ticket_reply",
                "Reply to ticket with progress, result, or request for user input.",
                serde_json::json!({
                    "message": {"type": "string", "description": "Reply content to post into the ticket."},
                    "waiting_user": {"type": "boolean", "description": "Set true if user needs to provide more information."},
                    "ticket_id": {
                        "type": "string",
                        "description": "Optional ticket id. If not given, use current session ticket.",
                    },
                }),
                &["message"],
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        match function_name {
            "ticket_get" => {
                let ticket = match self.resolve_ticket(optional_str(args, "ticket_id")).await {
                    Ok(ticket) => ticket,
                    Err(failure) => return failure,
                };
                let comments = tail(&ticket.comments, 20);
                let events = tail(&ticket.events, 20);
                ToolResult::ok(serde_json::json!({
                    "ticket_id": ticket.id,
                    "title": ticket.title,
                    "description": ticket.description,
                    "status": ticket.status.as_str(),
                    "priority": ticket.priority.as_str(),
                    "urgency": ticket.urgency.as_str(),
                    "tags": ticket.tags,
                    "node_ids": ticket.node_ids,
                    "plugin_ids": ticket.plugin_ids,
                    "session_id": ticket.session_id,
                    "comments": comments,
                    "events": events,
                }))
            }
            "ticket_update_status" => {
                let status = match require_str(args, "status") {
                    Ok(status) => status,
                    Err(failure) => return failure,
                };
                let new_status: TicketStatus = match serde_json::from_value(Value::String(
                    status.to_string(),
                )) {
                    Ok(status) => status,
                    Err(_) => return ToolResult::fail(format!("Invalid ticket status: {status}")),
                };
                let mut ticket = match self.resolve_ticket(optional_str(args, "ticket_id")).await {
                    Ok(ticket) => ticket,
                    Err(failure) => return failure,
                };
                ticket.transition_status(new_status);
                if let Err(err) = self.store.save(&ticket).await {
                    return ToolResult::fail(err.to_string());
                }
                ToolResult::ok(serde_json::json!({
                    "ticket_id": ticket.id,
                    "status": ticket.status.as_str(),
                }))
            }
            "ticket_reply" => {
                let message = match require_str(args, "message") {
                    Ok(message) => message,
                    Err(failure) => return failure,
                };
                let waiting_user = args
                    .get("waiting_user")
                    .and_then(|w| w.as_bool())
                    .unwrap_or(false);
                let mut ticket = match self.resolve_ticket(optional_str(args, "ticket_id")).await {
                    Ok(ticket) => ticket,
                    Err(failure) => return failure,
                };
                ticket
                    .comments
                    .push(TicketComment::new(TicketCommentRole::Ai, message.trim()));
                ticket.events.push(TicketEvent::new(
                    TicketEventType::AiResponded,
                    "AI posted a ticket reply",
                ));
                if ticket.first_response_at.is_none() {
                    ticket.first_response_at = Some(Utc::now());
                }
                ticket.status = if waiting_user {
                    TicketStatus::WaitingUser
                } else {
                    TicketStatus::Processing
                };
                ticket.updated_at = Utc::now();
                if let Err(err) = self.store.save(&ticket).await {
                    return ToolResult::fail(err.to_string());
                }
                ToolResult::ok(serde_json::json!({
                    "ticket_id": ticket.id,
                    "status": ticket.status.as_str(),
                }))
            }
            other => ToolResult::fail(format!("Unknown ticket function: {other}")),
        }
    }
}
