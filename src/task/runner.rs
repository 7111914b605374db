//! Agent task runner
//!
//! The per-session worker. It pops messages from the input stream, drives
//! the plan-act flow, and writes every event durably: the output stream
//! assigns the event id, then the session store keeps the canonical copy.
//! Attachment reconciliation and tool-event enrichment happen here, both
//! best-effort: a failed sync never fails the event emission.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use super::{TaskHandle, TaskRunner};
use crate::flow::PlanActFlow;
use crate::models::{
    AgentEvent, FileInfo, MessageRole, SessionStatus, ToolContent, ToolStatus,
};
use crate::models::{SearchResults, UserMessage};
use crate::queue::MessageQueue;
use crate::sandbox::{Browser, Sandbox};
use crate::store::{FileStorage, McpConfigRepository, SessionStore};
use crate::tools::{McpTool, ToolResult};

const UPLOAD_DIR: &str = "/home/ubuntu/upload/";

pub struct AgentTaskRunner {
    session_id: String,
    agent_id: String,
    user_id: String,
    sessions: SessionStore,
    files: FileStorage,
    sandbox: Arc<dyn Sandbox>,
    browser: Arc<dyn Browser>,
    mcp_tool: Arc<McpTool>,
    mcp_config: McpConfigRepository,
    flow: Mutex<PlanActFlow>,
}

impl AgentTaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        user_id: impl Into<String>,
        sessions: SessionStore,
        files: FileStorage,
        sandbox: Arc<dyn Sandbox>,
        browser: Arc<dyn Browser>,
        mcp_tool: Arc<McpTool>,
        mcp_config: McpConfigRepository,
        flow: PlanActFlow,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            user_id: user_id.into(),
            sessions,
            files,
            sandbox,
            browser,
            mcp_tool,
            mcp_config,
            flow: Mutex::new(flow),
        }
    }

    /// Durable append: output stream assigns the id, then the session store
    /// keeps the canonical copy under that id.
    async fn put_and_add_event(&self, task: &TaskHandle, event: &mut AgentEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "Event serialization failed");
                return;
            }
        };
        match task.output_stream().put(&payload).await {
            Ok(id) => event.set_id(id),
            Err(err) => {
                tracing::error!(error = %err, "Output stream append failed");
            }
        }
        if let Err(err) = self.sessions.add_event(&self.session_id, event).await {
            tracing::error!(error = %err, "Session event append failed");
        }
    }

    // ── attachment reconciliation ────────────────────────────────────────

    /// Storage → sandbox; records the landed path on the returned FileInfo
    pub async fn sync_file_to_sandbox(&self, file_id: &str) -> Option<FileInfo> {
        let result = async {
            let (data, mut info) = self.files.download_file(file_id, &self.user_id).await?;
            let file_path = format!("{UPLOAD_DIR}{}", info.filename);
            let upload = self.sandbox.file_upload(data, &file_path).await?;
            if upload.success {
                info.file_path = Some(file_path);
                Ok(Some(info))
            } else {
                Ok::<_, crate::error::Error>(None)
            }
        }
        .await;
        match result {
            Ok(info) => info,
            Err(err) => {
                tracing::error!(agent_id = %self.agent_id, error = %err, "Failed to sync file to sandbox");
                None
            }
        }
    }

    /// Sandbox → storage; replaces any prior copy registered for this path
    pub async fn sync_file_to_storage(&self, file_path: &str) -> Option<FileInfo> {
        let result = async {
            let existing = self
                .sessions
                .get_file_by_path(&self.session_id, file_path)
                .await?;
            let data = self.sandbox.file_download(file_path).await?;
            if let Some(previous) = existing {
                self.sessions
                    .remove_file(&self.session_id, &previous.file_id)
                    .await?;
                self.files.delete_file(&previous.file_id).await?;
            }
            let file_name = file_path.rsplit('/').next().unwrap_or(file_path);
            let mut info = self
                .files
                .upload_file(data, file_name, &self.user_id)
                .await?;
            info.file_path = Some(file_path.to_string());
            self.sessions.add_file(&self.session_id, &info).await?;
            Ok::<_, crate::error::Error>(info)
        }
        .await;
        match result {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::error!(agent_id = %self.agent_id, error = %err, "Failed to sync file to storage");
                None
            }
        }
    }

    /// Inbound user attachments land in the sandbox upload directory
    async fn sync_attachments_to_sandbox(&self, event: &mut AgentEvent) -> Vec<String> {
        let AgentEvent::Message { attachments, .. } = event else {
            return Vec::new();
        };
        let Some(pending) = attachments.take() else {
            return Vec::new();
        };
        let mut synced = Vec::new();
        let mut paths = Vec::new();
        for attachment in pending {
            if attachment.file_id.is_empty() {
                continue;
            }
            if let Some(info) = self.sync_file_to_sandbox(&attachment.file_id).await {
                if let Err(err) = self.sessions.add_file(&self.session_id, &info).await {
                    tracing::error!(error = %err, "Failed to record synced file");
                }
                if let Some(path) = &info.file_path {
                    paths.push(path.clone());
                }
                synced.push(info);
            }
        }
        *attachments = Some(synced);
        paths
    }

    /// Outbound assistant attachments (sandbox paths) become storage files
    async fn sync_attachments_to_storage(&self, event: &mut AgentEvent) {
        let AgentEvent::Message { attachments, .. } = event else {
            return;
        };
        let Some(pending) = attachments.take() else {
            return;
        };
        let mut synced = Vec::new();
        for attachment in pending {
            let Some(path) = attachment.file_path.as_deref() else {
                continue;
            };
            if let Some(info) = self.sync_file_to_storage(path).await {
                synced.push(info);
            }
        }
        *attachments = (!synced.is_empty()).then_some(synced);
    }

    // ── tool-event enrichment ────────────────────────────────────────────

    async fn screenshot_file_id(&self) -> crate::error::Result<String> {
        let shot = self.browser.screenshot().await?;
        let info = self
            .files
            .upload_file(shot, "screenshot.png", &self.user_id)
            .await?;
        Ok(info.file_id)
    }

    /// Attach tool-specific content to a completed tool event
    async fn enrich_tool_event(&self, event: &mut AgentEvent) {
        let AgentEvent::Tool {
            tool_name,
            function_args,
            status,
            function_result,
            tool_content,
            ..
        } = event
        else {
            return;
        };
        if *status != ToolStatus::Called {
            return;
        }

        let content = match tool_name.as_str() {
            "browser" => match self.screenshot_file_id().await {
                Ok(file_id) => Some(ToolContent::Browser { screenshot: file_id }),
                Err(err) => {
                    tracing::error!(error = %err, "Screenshot capture failed");
                    None
                }
            },
            "search" => function_result
                .as_ref()
                .and_then(|result| result.data.clone())
                .and_then(|data| serde_json::from_value::<SearchResults>(data).ok())
                .map(|results| ToolContent::Search {
                    results: results.results,
                }),
            "shell" => {
                let console = match function_args.get("id").and_then(|id| id.as_str()) {
                    Some(shell_id) => match self.sandbox.view_shell(shell_id).await {
                        Ok(view) => view
                            .data
                            .and_then(|data| data.get("console").cloned())
                            .unwrap_or_else(|| serde_json::json!([])),
                        Err(err) => {
                            tracing::error!(error = %err, "Shell view failed");
                            serde_json::json!("(No Console)")
                        }
                    },
                    None => serde_json::json!("(No Console)"),
                };
                Some(ToolContent::Shell { console })
            }
            "file" => match function_args.get("file").and_then(|file| file.as_str()) {
                Some(path) => {
                    let content = match self.sandbox.file_read(path).await {
                        Ok(read) => read
                            .data
                            .and_then(|data| data.get("content").cloned())
                            .and_then(|content| content.as_str().map(str::to_string))
                            .unwrap_or_default(),
                        Err(err) => {
                            tracing::error!(error = %err, "File read failed");
                            String::new()
                        }
                    };
                    self.sync_file_to_storage(path).await;
                    Some(ToolContent::File { content })
                }
                None => Some(ToolContent::File {
                    content: "(No Content)".to_string(),
                }),
            },
            "mcp" | "ticket" => Some(ToolContent::Mcp {
                result: mirror_result(function_result.as_ref()),
            }),
            "ssh" => {
                let data = function_result
                    .as_ref()
                    .and_then(|result| result.data.clone())
                    .unwrap_or_else(|| serde_json::json!({}));
                let get_str = |key: &str| {
                    data.get(key)
                        .and_then(|value| value.as_str())
                        .map(str::to_string)
                };
                Some(ToolContent::Ssh {
                    node_id: get_str("node_id"),
                    node_name: get_str("node_name"),
                    command: get_str("command").or_else(|| {
                        function_args
                            .get("command")
                            .and_then(|command| command.as_str())
                            .map(str::to_string)
                    }),
                    output: get_str("output"),
                    success: data.get("success").and_then(|value| value.as_bool()),
                    approval_required: data
                        .get("approval_required")
                        .and_then(|value| value.as_bool())
                        .unwrap_or(false),
                    approval_id: get_str("approval_id"),
                })
            }
            "message" => None,
            other => {
                tracing::warn!(tool = other, "Unknown tool event, no enrichment");
                None
            }
        };

        if content.is_some() {
            *tool_content = content;
        }
    }

    // ── main loop ────────────────────────────────────────────────────────

    async fn process_input(&self, task: &TaskHandle) {
        while !task.input_stream().is_empty().await {
            let (event_id, payload) = task.input_stream().pop().await;
            let Some(payload) = payload else {
                tracing::warn!(agent_id = %self.agent_id, "Empty message popped from input stream");
                continue;
            };
            let mut inbound: AgentEvent = match serde_json::from_str(&payload) {
                Ok(event) => event,
                Err(err) => {
                    tracing::error!(error = %err, "Unparseable input event");
                    continue;
                }
            };
            if let Some(event_id) = event_id {
                inbound.set_id(event_id);
            }

            let (text, _role) = match &inbound {
                AgentEvent::Message { message, role, .. } => (message.clone(), *role),
                _ => (String::new(), MessageRole::User),
            };
            let attachment_paths = self.sync_attachments_to_sandbox(&mut inbound).await;

            tracing::info!(
                agent_id = %self.agent_id,
                message = %text.chars().take(50).collect::<String>(),
                "Processing message"
            );

            if text.is_empty() {
                let mut error = AgentEvent::error("No message");
                self.put_and_add_event(task, &mut error).await;
                continue;
            }

            let user_message = UserMessage {
                message: text,
                attachments: attachment_paths,
            };

            let mut flow = self.flow.lock().await;
            let mut events = flow.run(user_message);
            while let Some(mut event) = events.next().await {
                let is_tool = matches!(&event, AgentEvent::Tool { .. });
                let is_assistant_message = matches!(
                    &event,
                    AgentEvent::Message { role, .. } if *role == MessageRole::Assistant
                );
                if is_tool {
                    self.enrich_tool_event(&mut event).await;
                } else if is_assistant_message {
                    self.sync_attachments_to_storage(&mut event).await;
                }

                self.put_and_add_event(task, &mut event).await;

                match &event {
                    AgentEvent::Title { title, .. } => {
                        if let Err(err) = self.sessions.update_title(&self.session_id, title).await
                        {
                            tracing::error!(error = %err, "Title update failed");
                        }
                    }
                    AgentEvent::Message { message, meta, .. } => {
                        let _ = self
                            .sessions
                            .update_latest_message(&self.session_id, message, meta.timestamp)
                            .await;
                        let _ = self
                            .sessions
                            .increment_unread_message_count(&self.session_id)
                            .await;
                    }
                    AgentEvent::Wait { .. } => {
                        let _ = self
                            .sessions
                            .update_status(&self.session_id, SessionStatus::Waiting)
                            .await;
                        return;
                    }
                    _ => {}
                }

                // A newer message preempts the rest of this flow iteration
                if !task.input_stream().is_empty().await {
                    break;
                }
            }
        }

        if let Err(err) = self
            .sessions
            .update_status(&self.session_id, SessionStatus::Completed)
            .await
        {
            tracing::error!(error = %err, "Completion status update failed");
        }
    }
}

fn mirror_result(result: Option<&ToolResult>) -> serde_json::Value {
    match result {
        Some(result) => match &result.data {
            Some(data) => data.clone(),
            None if !result.success => {
                let message = if result.message.is_empty() {
                    "MCP tool failed"
                } else {
                    &result.message
                };
                serde_json::Value::String(format!("[MCP_ERROR] {message}"))
            }
            None => serde_json::to_value(result)
                .unwrap_or_else(|_| serde_json::Value::String("No result available".into())),
        },
        None => serde_json::Value::String("No result available".into()),
    }
}

#[async_trait::async_trait]
impl TaskRunner for AgentTaskRunner {
    async fn run(&self, task: &TaskHandle) {
        tracing::info!(agent_id = %self.agent_id, "Agent task started");

        if let Err(err) = self.sandbox.ensure().await {
            tracing::error!(error = %err, "Sandbox ensure failed");
            let mut error = AgentEvent::error(format!("Sandbox unavailable: {err}"));
            self.put_and_add_event(task, &mut error).await;
            let _ = self
                .sessions
                .update_status(&self.session_id, SessionStatus::Completed)
                .await;
            return;
        }

        // Best-effort: a broken MCP config never aborts the task
        match self.mcp_config.get_mcp_config().await {
            Ok(config) => self.mcp_tool.initialize(config).await,
            Err(err) => {
                tracing::warn!(error = %err, "MCP config load failed, continuing without MCP");
            }
        }

        self.process_input(task).await;
        tracing::info!(agent_id = %self.agent_id, "Agent task drained");
    }

    async fn finalize_cancel(&self, task: &TaskHandle) {
        let mut done = AgentEvent::done();
        self.put_and_add_event(task, &mut done).await;
        if let Err(err) = self
            .sessions
            .update_status(&self.session_id, SessionStatus::Completed)
            .await
        {
            tracing::error!(error = %err, "Status update on cancel failed");
        }
    }

    async fn destroy(&self) {
        tracing::debug!(agent_id = %self.agent_id, "Destroying agent task resources");
        if let Err(err) = self.sandbox.destroy().await {
            tracing::warn!(error = %err, "Sandbox destroy failed");
        }
        self.mcp_tool.cleanup().await;
    }
}
