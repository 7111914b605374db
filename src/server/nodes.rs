//! Node and approval routes

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::{ok, AppState, AuthUser};
use crate::error::Result;
use crate::services::NodePayload;

pub async fn list_nodes(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let nodes = state.node_service.list_nodes(&user_id).await?;
    Ok(ok(nodes))
}

pub async fn create_node(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<NodePayload>,
) -> Result<Json<serde_json::Value>> {
    let node = state.node_service.create_node(&user_id, payload).await?;
    Ok(ok(node))
}

pub async fn get_node(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let node = state.node_service.get_node(&user_id, &node_id).await?;
    Ok(ok(node))
}

pub async fn update_node(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(node_id): Path<String>,
    Json(payload): Json<NodePayload>,
) -> Result<Json<serde_json::Value>> {
    let node = state
        .node_service
        .update_node(&user_id, &node_id, payload)
        .await?;
    Ok(ok(node))
}

pub async fn delete_node(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.node_service.delete_node(&user_id, &node_id).await?;
    Ok(ok(()))
}

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    pub exec_dir: Option<String>,
    /// Mirror the command and output into the session history so the agent
    /// stays aware of the takeover
    #[serde(default)]
    pub sync_to_ai: bool,
    pub session_id: Option<String>,
}

pub async fn exec_command(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(node_id): Path<String>,
    Json(request): Json<ExecRequest>,
) -> Result<Json<serde_json::Value>> {
    let result = state
        .node_service
        .run_command(
            &user_id,
            &node_id,
            &request.command,
            request.exec_dir.as_deref(),
            "user",
            Some(&user_id),
            "manual",
            request.session_id.as_deref(),
        )
        .await?;

    if request.sync_to_ai {
        if let Some(session_id) = &request.session_id {
            let output = result
                .data
                .as_ref()
                .and_then(|data| data.get("output").and_then(|o| o.as_str()))
                .unwrap_or_default();
            state
                .node_service
                .append_takeover_message(session_id, &node_id, &request.command, output)
                .await?;
        }
    }

    Ok(ok(result))
}

pub async fn node_overview(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(node_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let overview = state
        .node_service
        .get_node_overview(&user_id, &node_id)
        .await?;
    Ok(ok(overview))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: i64,
}

fn default_log_limit() -> i64 {
    100
}

pub async fn node_logs(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(node_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>> {
    let logs = state
        .node_service
        .list_logs(&user_id, &node_id, query.limit)
        .await?;
    Ok(ok(logs))
}

pub async fn pending_approvals(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let approvals = state.node_service.list_pending_approvals(&session_id).await?;
    Ok(ok(approvals))
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub approve: bool,
    pub reject_reason: Option<String>,
}

pub async fn decide_approval(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(approval_id): Path<String>,
    Json(request): Json<DecideRequest>,
) -> Result<Json<serde_json::Value>> {
    let result = state
        .node_service
        .decide_approval(
            &user_id,
            &approval_id,
            request.approve,
            request.reject_reason.as_deref(),
        )
        .await?;
    Ok(ok(result))
}
