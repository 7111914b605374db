//! Agent coordinator
//!
//! Creates and resumes per-session tasks, exposes the client-visible chat
//! generator that tails the task's output stream from a cursor, and owns
//! the rest of the session surface (sharing, files, shell/file views, VNC).

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;

use crate::agents::{AgentRuntime, ExecutionAgent, PlannerAgent};
use crate::error::{Error, Result};
use crate::flow::PlanActFlow;
use crate::llm::Llm;
use crate::models::{Agent, AgentEvent, FileInfo, Session, SessionStatus, SessionType};
use crate::queue::MessageQueue;
use crate::sandbox::{Sandbox, SandboxManager};
use crate::services::{NodeService, UrlSigner};
use crate::store::{
    AgentStore, FileStorage, McpConfigRepository, SessionStore, TicketStore,
};
use crate::task::{AgentTaskRunner, TaskHandle, TaskRegistry};
use crate::tools::{
    BrowserTool, FileTool, McpTool, MessageTool, SearchEngine, SearchTool, ShellTool, SshNodeTool,
    TicketTool, Tool, ToolSet,
};

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(30);
const TAIL_BLOCK_MS: u64 = 1000;

pub struct AgentService {
    llm: Arc<dyn Llm>,
    agents: AgentStore,
    sessions: SessionStore,
    files: FileStorage,
    tickets: TicketStore,
    node_service: Arc<NodeService>,
    sandboxes: Arc<dyn SandboxManager>,
    registry: TaskRegistry,
    mcp_config: McpConfigRepository,
    search_engine: Option<Arc<dyn SearchEngine>>,
    signer: UrlSigner,
}

impl AgentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn Llm>,
        agents: AgentStore,
        sessions: SessionStore,
        files: FileStorage,
        tickets: TicketStore,
        node_service: Arc<NodeService>,
        sandboxes: Arc<dyn SandboxManager>,
        registry: TaskRegistry,
        mcp_config: McpConfigRepository,
        search_engine: Option<Arc<dyn SearchEngine>>,
        signer: UrlSigner,
    ) -> Self {
        Self {
            llm,
            agents,
            sessions,
            files,
            tickets,
            node_service,
            sandboxes,
            registry,
            mcp_config,
            search_engine,
            signer,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ── session lifecycle ────────────────────────────────────────────────

    /// Allocate a fresh agent from the LLM defaults and a session owning it
    pub async fn create_session(
        &self,
        user_id: &str,
        session_type: SessionType,
    ) -> Result<Session> {
        let agent = Agent::new(
            self.llm.model_name(),
            self.llm.temperature(),
            self.llm.max_tokens(),
        );
        self.agents.save(&agent).await?;

        let mut session = Session::new(user_id, &agent.id);
        session.session_type = session_type;
        self.sessions.save(&session).await?;
        tracing::info!(session_id = %session.id, user_id, "Session created");
        Ok(session)
    }

    async fn load_owned(&self, session_id: &str, user_id: &str) -> Result<Session> {
        self.sessions
            .find_by_id_and_user_id(session_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".into()))
    }

    /// Build the task runner owning this session's sandbox, browser, agents
    /// and tool registry, then register it.
    async fn create_task(&self, session: &mut Session) -> Result<TaskHandle> {
        let sandbox = match &session.sandbox_id {
            Some(sandbox_id) => self.sandboxes.get(sandbox_id).await?,
            None => None,
        };
        let sandbox = match sandbox {
            Some(sandbox) => sandbox,
            None => {
                let sandbox = self.sandboxes.create().await?;
                session.sandbox_id = Some(sandbox.id().to_string());
                self.sessions.save(session).await?;
                sandbox
            }
        };
        let browser = sandbox.browser();

        let mcp_tool = Arc::new(McpTool::new());
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ShellTool::new(sandbox.clone())),
            Arc::new(BrowserTool::new(browser.clone())),
            Arc::new(FileTool::new(sandbox.clone())),
            Arc::new(MessageTool),
            mcp_tool.clone(),
            Arc::new(SshNodeTool::new(
                self.node_service.clone(),
                &session.user_id,
                &session.id,
            )),
            Arc::new(TicketTool::new(self.tickets.clone(), &session.id)),
        ];
        if let Some(engine) = &self.search_engine {
            tools.push(Arc::new(SearchTool::new(engine.clone())));
        }
        let tools = ToolSet::new(tools);

        let planner = PlannerAgent::new(AgentRuntime::new(
            &session.agent_id,
            PlannerAgent::config(),
            self.llm.clone(),
            tools.clone(),
            self.agents.clone(),
        ));
        let executor = ExecutionAgent::new(AgentRuntime::new(
            &session.agent_id,
            ExecutionAgent::config(),
            self.llm.clone(),
            tools,
            self.agents.clone(),
        ));
        let flow = PlanActFlow::new(&session.id, self.sessions.clone(), planner, executor);

        let runner = AgentTaskRunner::new(
            &session.id,
            &session.agent_id,
            &session.user_id,
            self.sessions.clone(),
            self.files.clone(),
            sandbox,
            browser,
            mcp_tool,
            self.mcp_config.clone(),
            flow,
        );

        let task = self.registry.create(Arc::new(runner)).await;
        session.task_id = Some(task.id().to_string());
        self.sessions.save(session).await?;
        Ok(task)
    }

    async fn get_task(&self, session: &Session) -> Option<TaskHandle> {
        let task_id = session.task_id.as_deref()?;
        self.registry.get(task_id).await
    }

    // ── chat ─────────────────────────────────────────────────────────────

    /// The client-visible chat generator.
    ///
    /// With a message: ensure a task exists (reusing a Running one), append
    /// the user message to its input stream (the stream-assigned ID becomes
    /// the event id) and start the worker. Always: tail the output stream
    /// from the client cursor until a terminal event. Any uncaught error
    /// becomes an Error event appended to the session and yielded.
    pub fn chat(
        self: Arc<Self>,
        session_id: String,
        user_id: String,
        message: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        event_id: Option<String>,
        attachments: Vec<FileInfo>,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
        Box::pin(stream! {
            let mut cursor = event_id.unwrap_or_else(|| "0".to_string());

            let setup: Result<Option<TaskHandle>> = async {
                let mut session = self.load_owned(&session_id, &user_id).await?;
                let mut task = self.get_task(&session).await;

                if let Some(text) = &message {
                    if session.status != SessionStatus::Running || task.is_none() {
                        task = Some(self.create_task(&mut session).await?);
                    }
                    self.sessions
                        .update_latest_message(
                            &session_id,
                            text,
                            timestamp.unwrap_or_else(Utc::now),
                        )
                        .await?;

                    let mut event = AgentEvent::user_message(
                        text.clone(),
                        (!attachments.is_empty()).then(|| attachments.clone()),
                    );
                    let Some(task_ref) = task.as_ref() else {
                        return Err(Error::Server("Failed to create task".into()));
                    };
                    let payload = serde_json::to_string(&event)?;
                    let assigned = task_ref.input_stream().put(&payload).await?;
                    event.set_id(assigned);
                    self.sessions.add_event(&session_id, &event).await?;

                    task_ref.run().await;
                    tracing::debug!(session_id = %session_id, "Message enqueued");
                }
                Ok(task)
            }
            .await;

            let task = match setup {
                Ok(task) => task,
                Err(err) => {
                    let event = AgentEvent::error(err.to_string());
                    if let Err(store_err) = self.sessions.add_event(&session_id, &event).await {
                        tracing::error!(error = %store_err, "Failed to record chat error");
                    }
                    yield event;
                    let _ = self
                        .sessions
                        .update_unread_message_count(&session_id, 0)
                        .await;
                    return;
                }
            };

            if let Some(task) = task {
                tracing::info!(session_id = %session_id, task_id = %task.id(), "Chat stream started");
                loop {
                    if task.done().await && task.output_stream().get(&cursor, None).await.0.is_none()
                    {
                        break;
                    }
                    let (id, payload) =
                        task.output_stream().get(&cursor, Some(TAIL_BLOCK_MS)).await;
                    let Some(id) = id else {
                        continue;
                    };
                    cursor = id.clone();
                    let Some(payload) = payload else {
                        continue;
                    };
                    let mut event: AgentEvent = match serde_json::from_str(&payload) {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::error!(error = %err, "Unparseable output event");
                            continue;
                        }
                    };
                    event.set_id(id);
                    let _ = self
                        .sessions
                        .update_unread_message_count(&session_id, 0)
                        .await;
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
            }

            let _ = self
                .sessions
                .update_unread_message_count(&session_id, 0)
                .await;
            tracing::info!(session_id = %session_id, "Chat stream completed");
        })
    }

    /// Cancel the session's live task and mark it completed
    pub async fn stop_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        let session = self.load_owned(session_id, user_id).await?;
        if let Some(task) = self.get_task(&session).await {
            task.cancel();
        }
        self.sessions
            .update_status(session_id, SessionStatus::Completed)
            .await
    }

    // ── session surface ──────────────────────────────────────────────────

    pub async fn get_session(&self, session_id: &str, user_id: Option<&str>) -> Result<Session> {
        let session = match user_id {
            Some(user_id) => self.sessions.find_by_id_and_user_id(session_id, user_id).await?,
            None => self.sessions.find_by_id(session_id).await?,
        };
        session.ok_or_else(|| Error::NotFound("Session not found".into()))
    }

    pub async fn get_all_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        self.sessions.find_by_user_id(user_id).await
    }

    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.load_owned(session_id, user_id).await?;
        self.sessions.delete(session_id).await
    }

    pub async fn clear_unread_message_count(&self, session_id: &str) -> Result<()> {
        self.sessions.update_unread_message_count(session_id, 0).await
    }

    pub async fn get_session_files(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<FileInfo>> {
        Ok(self.get_session(session_id, user_id).await?.files)
    }

    pub async fn is_session_shared(&self, session_id: &str) -> Result<bool> {
        Ok(self.get_session(session_id, None).await?.is_shared)
    }

    pub async fn share_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.load_owned(session_id, user_id).await?;
        self.sessions.update_shared_status(session_id, true).await
    }

    pub async fn unshare_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.load_owned(session_id, user_id).await?;
        self.sessions.update_shared_status(session_id, false).await
    }

    pub async fn get_shared_session(&self, session_id: &str) -> Result<Session> {
        let session = self.get_session(session_id, None).await?;
        if !session.is_shared {
            return Err(Error::NotFound("Session not found".into()));
        }
        Ok(session)
    }

    /// Shared-session files come back with signed download links
    pub async fn get_shared_session_files(&self, session_id: &str) -> Result<Vec<Value>> {
        let session = self.get_shared_session(session_id).await?;
        Ok(session
            .files
            .into_iter()
            .map(|file| {
                let download_url = self.signer.create_signed_url(
                    &format!("/api/files/{}", file.file_id),
                    &[("session_id".to_string(), session_id.to_string())],
                    15,
                );
                serde_json::json!({
                    "file": file,
                    "download_url": download_url,
                })
            })
            .collect())
    }

    // ── sandbox views ────────────────────────────────────────────────────

    async fn session_sandbox(
        &self,
        session: &Session,
    ) -> Result<Arc<dyn crate::sandbox::Sandbox>> {
        let sandbox_id = session
            .sandbox_id
            .as_deref()
            .ok_or_else(|| Error::BadRequest("Session has no sandbox environment".into()))?;
        self.sandboxes
            .get(sandbox_id)
            .await?
            .ok_or_else(|| Error::NotFound("Sandbox environment not found".into()))
    }

    pub async fn shell_view(
        &self,
        session_id: &str,
        shell_session_id: &str,
        user_id: &str,
    ) -> Result<Value> {
        let session = self.load_owned(session_id, user_id).await?;
        let sandbox = self.session_sandbox(&session).await?;
        let result = sandbox.view_shell(shell_session_id).await?;
        if result.success {
            Ok(result.data.unwrap_or(Value::Null))
        } else {
            Err(Error::Server(format!(
                "Failed to get shell output: {}",
                result.message
            )))
        }
    }

    pub async fn file_view(
        &self,
        session_id: &str,
        file_path: &str,
        user_id: &str,
    ) -> Result<Value> {
        let session = self.load_owned(session_id, user_id).await?;
        let sandbox = self.session_sandbox(&session).await?;
        let result = sandbox.file_read(file_path).await?;
        if result.success {
            Ok(result.data.unwrap_or(Value::Null))
        } else {
            Err(Error::Server(format!(
                "Failed to read file: {}",
                result.message
            )))
        }
    }

    /// Signed URL to the session's VNC endpoint, 15-minute cap
    pub async fn get_vnc_url(&self, session_id: &str) -> Result<String> {
        let session = self.get_session(session_id, None).await?;
        let sandbox = self.session_sandbox(&session).await?;
        Ok(self.signer.create_signed_url(
            &sandbox.vnc_url(),
            &[("session_id".to_string(), session_id.to_string())],
            15,
        ))
    }

    /// Cancel everything within the shutdown budget; durable state survives
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down agent service");
        self.registry.destroy(SHUTDOWN_BUDGET).await;
    }
}
