//! Ticket routes

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{ok, AppState, AuthUser};
use crate::error::Result;
use crate::models::{TicketPriority, TicketStatus, TicketUrgency};
use crate::services::TicketPayload;

pub async fn create_ticket(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<TicketPayload>,
) -> Result<Json<serde_json::Value>> {
    let ticket = state
        .ticket_service
        .clone()
        .create_ticket(&user_id, payload)
        .await?;
    Ok(ok(ticket))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let tickets = state.ticket_service.list_tickets(&user_id).await?;
    Ok(ok(tickets))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(ticket_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let ticket = state.ticket_service.get_ticket(&ticket_id, &user_id).await?;
    Ok(ok(ticket))
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub message: String,
}

pub async fn reply_ticket(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(ticket_id): Path<String>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<serde_json::Value>> {
    let ticket = state
        .ticket_service
        .clone()
        .reply_ticket(&ticket_id, &user_id, &request.message)
        .await?;
    Ok(ok(ticket))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub urgency: Option<TicketUrgency>,
    pub tags: Option<Vec<String>>,
    pub estimated_minutes: Option<i64>,
    pub spent_minutes: Option<i64>,
    pub sla_due_at: Option<DateTime<Utc>>,
}

pub async fn update_ticket(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(ticket_id): Path<String>,
    Json(request): Json<UpdateTicketRequest>,
) -> Result<Json<serde_json::Value>> {
    let ticket = state
        .ticket_service
        .update_ticket(
            &ticket_id,
            &user_id,
            request.status,
            request.priority,
            request.urgency,
            request.tags,
            request.estimated_minutes,
            request.spent_minutes,
            request.sla_due_at,
        )
        .await?;
    Ok(ok(ticket))
}
