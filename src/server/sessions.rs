//! Session routes

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;

use super::{ok, AppState, AuthUser};
use crate::error::Result;
use crate::models::{FileInfo, SessionType};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub event_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentRef {
    pub file_id: String,
    pub filename: String,
}

/// Chat with the session's agent; the response is an SSE stream of typed
/// events ending in done/error/wait.
pub async fn chat(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let attachments: Vec<FileInfo> = request
        .attachments
        .into_iter()
        .map(|attachment| FileInfo {
            file_id: attachment.file_id,
            filename: attachment.filename,
            user_id: user_id.clone(),
            ..Default::default()
        })
        .collect();

    let events = state.agent_service.clone().chat(
        session_id,
        user_id,
        request.message,
        request.timestamp,
        request.event_id,
        attachments,
    );

    let sse_stream = events.map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","error":"serialization failed"}"#.to_string());
        Ok(SseEvent::default().data(data))
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}

pub async fn create_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let session = state
        .agent_service
        .create_session(&user_id, SessionType::Chat)
        .await?;
    Ok(ok(session))
}

pub async fn get_all_sessions(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
) -> Result<Json<serde_json::Value>> {
    let sessions = state.agent_service.get_all_sessions(&user_id).await?;
    Ok(ok(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let session = state
        .agent_service
        .get_session(&session_id, Some(&user_id))
        .await?;
    Ok(ok(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state
        .agent_service
        .delete_session(&session_id, &user_id)
        .await?;
    Ok(ok(()))
}

pub async fn stop_session(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state
        .agent_service
        .stop_session(&session_id, &user_id)
        .await?;
    Ok(ok(()))
}

pub async fn clear_unread(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state
        .agent_service
        .clear_unread_message_count(&session_id)
        .await?;
    Ok(ok(()))
}

pub async fn get_files(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let files = state
        .agent_service
        .get_session_files(&session_id, Some(&user_id))
        .await?;
    Ok(ok(files))
}

pub async fn share(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state
        .agent_service
        .share_session(&session_id, &user_id)
        .await?;
    Ok(ok(()))
}

pub async fn unshare(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state
        .agent_service
        .unshare_session(&session_id, &user_id)
        .await?;
    Ok(ok(()))
}

pub async fn get_shared_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let session = state.agent_service.get_shared_session(&session_id).await?;
    Ok(ok(session))
}

pub async fn get_shared_files(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let files = state
        .agent_service
        .get_shared_session_files(&session_id)
        .await?;
    Ok(ok(files))
}

#[derive(Debug, Deserialize)]
pub struct ShellViewQuery {
    pub shell_id: String,
}

pub async fn shell_view(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
    Query(query): Query<ShellViewQuery>,
) -> Result<Json<serde_json::Value>> {
    let view = state
        .agent_service
        .shell_view(&session_id, &query.shell_id, &user_id)
        .await?;
    Ok(ok(view))
}

#[derive(Debug, Deserialize)]
pub struct FileViewQuery {
    pub path: String,
}

pub async fn file_view(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(session_id): Path<String>,
    Query(query): Query<FileViewQuery>,
) -> Result<Json<serde_json::Value>> {
    let view = state
        .agent_service
        .file_view(&session_id, &query.path, &user_id)
        .await?;
    Ok(ok(view))
}

pub async fn vnc_signed_url(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let signed_url = state.agent_service.get_vnc_url(&session_id).await?;
    Ok(ok(serde_json::json!({
        "signed_url": signed_url,
        "expires_in": 15 * 60,
    })))
}
