//! HTTP server wiring the coordinator surface

mod auth;
mod nodes;
mod sessions;
mod tickets;

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::error::Result;
use crate::services::{AgentService, NodeService, TicketService};

pub use auth::AuthUser;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub agent_service: Arc<AgentService>,
    pub node_service: Arc<NodeService>,
    pub ticket_service: Arc<TicketService>,
    pub settings: Arc<Settings>,
}

/// Uniform success envelope
pub(crate) fn ok<T: serde::Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "code": 0,
        "msg": "success",
        "data": data,
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Sessions
        .route(
            "/api/sessions",
            put(sessions::create_session).get(sessions::get_all_sessions),
        )
        .route(
            "/api/sessions/:session_id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/sessions/:session_id/chat", post(sessions::chat))
        .route("/api/sessions/:session_id/stop", post(sessions::stop_session))
        .route(
            "/api/sessions/:session_id/unread/clear",
            post(sessions::clear_unread),
        )
        .route("/api/sessions/:session_id/files", get(sessions::get_files))
        .route("/api/sessions/:session_id/share", post(sessions::share))
        .route("/api/sessions/:session_id/unshare", post(sessions::unshare))
        .route("/api/sessions/:session_id/shell", get(sessions::shell_view))
        .route("/api/sessions/:session_id/file", get(sessions::file_view))
        .route(
            "/api/sessions/:session_id/vnc/signed-url",
            post(sessions::vnc_signed_url),
        )
        .route("/api/shared/:session_id", get(sessions::get_shared_session))
        .route(
            "/api/shared/:session_id/files",
            get(sessions::get_shared_files),
        )
        // Nodes & approvals
        .route("/api/nodes", get(nodes::list_nodes).post(nodes::create_node))
        .route(
            "/api/nodes/:node_id",
            get(nodes::get_node)
                .put(nodes::update_node)
                .delete(nodes::delete_node),
        )
        .route("/api/nodes/:node_id/exec", post(nodes::exec_command))
        .route("/api/nodes/:node_id/overview", get(nodes::node_overview))
        .route("/api/nodes/:node_id/logs", get(nodes::node_logs))
        .route(
            "/api/sessions/:session_id/approvals",
            get(nodes::pending_approvals),
        )
        .route(
            "/api/approvals/:approval_id/decide",
            post(nodes::decide_approval),
        )
        // Tickets
        .route(
            "/api/tickets",
            post(tickets::create_ticket).get(tickets::list_tickets),
        )
        .route(
            "/api/tickets/:ticket_id",
            get(tickets::get_ticket).put(tickets::update_ticket),
        )
        .route("/api/tickets/:ticket_id/reply", post(tickets::reply_ticket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the process receives a shutdown signal
pub async fn run(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
