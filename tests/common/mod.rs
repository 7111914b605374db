//! Shared test fixtures: in-memory storage, scripted LLM, fake sandbox

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use opspilot::database::Database;
use opspilot::error::Result;
use opspilot::llm::{ChatMessage, ChatResponse, Llm, ResponseFormat, ToolCallRequest};
use opspilot::queue::MemoryStreamQueue;
use opspilot::sandbox::{Browser, Sandbox, SandboxManager};
use opspilot::services::{AgentService, NodeService, UrlSigner};
use opspilot::store::{
    AgentStore, FileStorage, McpConfigRepository, NodeStore, SessionStore, TicketStore,
};
use opspilot::task::TaskRegistry;
use opspilot::tools::ToolResult;

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    Database::from_pool(pool.clone())
        .initialize()
        .await
        .expect("migrations");
    pool
}

// ── scripted LLM ─────────────────────────────────────────────────────────

/// One scripted model turn
pub enum ScriptStep {
    /// Final text answer
    Text(String),
    /// Tool calls for this turn
    Tools(Vec<ToolCallRequest>),
    /// Never resolves; used to test cancellation mid-flow
    Hang,
}

pub struct ScriptedLlm {
    steps: Mutex<VecDeque<ScriptStep>>,
}

impl ScriptedLlm {
    pub fn new(steps: Vec<ScriptStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
        })
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn ask(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
        _format: ResponseFormat,
    ) -> Result<ChatResponse> {
        let step = self.steps.lock().await.pop_front();
        match step {
            Some(ScriptStep::Text(content)) => Ok(ChatResponse {
                content,
                tool_calls: Vec::new(),
            }),
            Some(ScriptStep::Tools(tool_calls)) => Ok(ChatResponse {
                content: String::new(),
                tool_calls,
            }),
            Some(ScriptStep::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(opspilot::error::Error::Llm("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    fn temperature(&self) -> f32 {
        0.0
    }

    fn max_tokens(&self) -> u32 {
        1024
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

// ── fake sandbox ─────────────────────────────────────────────────────────

pub struct FakeSandbox {
    id: String,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub destroyed: AtomicBool,
}

impl FakeSandbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: "sandbox-test".to_string(),
            files: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn vnc_url(&self) -> String {
        "http://sandbox.test/vnc".to_string()
    }

    async fn ensure(&self) -> Result<()> {
        Ok(())
    }

    async fn exec_shell(
        &self,
        shell_id: &str,
        _exec_dir: Option<&str>,
        command: &str,
    ) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({
            "id": shell_id,
            "output": format!("ran: {command}"),
        })))
    }

    async fn view_shell(&self, shell_id: &str) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({
            "id": shell_id,
            "console": ["$ echo hello", "hello"],
        })))
    }

    async fn wait_shell(&self, shell_id: &str, _seconds: u64) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({"id": shell_id})))
    }

    async fn file_read(&self, path: &str) -> Result<ToolResult> {
        let files = self.files.lock().await;
        let content = files
            .get(path)
            .map(|data| String::from_utf8_lossy(data).to_string())
            .unwrap_or_else(|| "file contents".to_string());
        Ok(ToolResult::ok(serde_json::json!({"file": path, "content": content})))
    }

    async fn file_write(&self, path: &str, content: &str, append: bool) -> Result<ToolResult> {
        let mut files = self.files.lock().await;
        if append {
            files
                .entry(path.to_string())
                .or_default()
                .extend_from_slice(content.as_bytes());
        } else {
            files.insert(path.to_string(), content.as_bytes().to_vec());
        }
        Ok(ToolResult::ok(serde_json::json!({"file": path})))
    }

    async fn file_upload(&self, data: Vec<u8>, path: &str) -> Result<ToolResult> {
        self.files.lock().await.insert(path.to_string(), data);
        Ok(ToolResult::ok(serde_json::json!({"file": path})))
    }

    async fn file_download(&self, path: &str) -> Result<Vec<u8>> {
        let files = self.files.lock().await;
        Ok(files
            .get(path)
            .cloned()
            .unwrap_or_else(|| b"file contents".to_vec()))
    }

    fn browser(&self) -> Arc<dyn Browser> {
        Arc::new(FakeBrowser)
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeBrowser;

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({"url": url})))
    }

    async fn view_page(&self) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({"content": "<html/>"})))
    }

    async fn click(&self, _selector: &str) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({})))
    }

    async fn input(&self, _selector: &str, _text: &str) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({})))
    }

    async fn scroll(&self, _direction: &str) -> Result<ToolResult> {
        Ok(ToolResult::ok(serde_json::json!({})))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

pub struct FakeSandboxManager {
    pub sandbox: Arc<FakeSandbox>,
}

#[async_trait]
impl SandboxManager for FakeSandboxManager {
    async fn create(&self) -> Result<Arc<dyn Sandbox>> {
        Ok(self.sandbox.clone())
    }

    async fn get(&self, _sandbox_id: &str) -> Result<Option<Arc<dyn Sandbox>>> {
        Ok(Some(self.sandbox.clone()))
    }
}

// ── full service wiring ──────────────────────────────────────────────────

pub struct TestEnv {
    pub agent_service: Arc<AgentService>,
    pub node_service: Arc<NodeService>,
    pub sessions: SessionStore,
    pub agents: AgentStore,
    pub nodes: NodeStore,
    pub tickets: TicketStore,
    pub sandbox: Arc<FakeSandbox>,
    pub pool: SqlitePool,
    _storage_dir: tempfile::TempDir,
}

pub async fn build_env(llm: Arc<dyn Llm>) -> TestEnv {
    let pool = memory_pool().await;
    let storage_dir = tempfile::tempdir().expect("tempdir");

    let sessions = SessionStore::new(pool.clone());
    let agents = AgentStore::new(pool.clone());
    let nodes = NodeStore::new(pool.clone());
    let tickets = TicketStore::new(pool.clone());
    let files = FileStorage::new(pool.clone(), storage_dir.path());
    let mcp_config = McpConfigRepository::new(storage_dir.path().join("mcp.json"));

    let registry = TaskRegistry::new(Arc::new(
        |_name: &str| -> Arc<dyn opspilot::queue::MessageQueue> {
            Arc::new(MemoryStreamQueue::new())
        },
    ));

    let sandbox = FakeSandbox::new();
    let node_service = Arc::new(NodeService::new(nodes.clone(), sessions.clone()));

    let agent_service = Arc::new(AgentService::new(
        llm,
        agents.clone(),
        sessions.clone(),
        files,
        tickets.clone(),
        node_service.clone(),
        Arc::new(FakeSandboxManager {
            sandbox: sandbox.clone(),
        }),
        registry,
        mcp_config,
        None,
        UrlSigner::new("test-secret"),
    ));

    TestEnv {
        agent_service,
        node_service,
        sessions,
        agents,
        nodes,
        tickets,
        sandbox,
        pool,
        _storage_dir: storage_dir,
    }
}

