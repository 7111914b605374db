//! Attachment reconciliation across the sandbox/storage boundary

mod common;

use std::sync::Arc;

use common::{FakeSandbox, ScriptedLlm};
use opspilot::agents::{AgentRuntime, ExecutionAgent, PlannerAgent};
use opspilot::flow::PlanActFlow;
use opspilot::models::{Session, SessionType};
use opspilot::sandbox::Sandbox;
use opspilot::store::{AgentStore, FileStorage, McpConfigRepository, SessionStore};
use opspilot::task::AgentTaskRunner;
use opspilot::tools::{McpTool, ToolSet};

struct RunnerFixture {
    runner: AgentTaskRunner,
    sessions: SessionStore,
    files: FileStorage,
    sandbox: Arc<FakeSandbox>,
    session: Session,
    _storage_dir: tempfile::TempDir,
}

async fn build_runner() -> RunnerFixture {
    let pool = common::memory_pool().await;
    let storage_dir = tempfile::tempdir().unwrap();

    let sessions = SessionStore::new(pool.clone());
    let agents = AgentStore::new(pool.clone());
    let files = FileStorage::new(pool.clone(), storage_dir.path());
    let mcp_config = McpConfigRepository::new(storage_dir.path().join("mcp.json"));

    let mut session = Session::new("user-1", "agent-1");
    session.session_type = SessionType::Chat;
    sessions.save(&session).await.unwrap();

    let llm = ScriptedLlm::new(vec![]);
    let tools = ToolSet::new(vec![]);
    let planner = PlannerAgent::new(AgentRuntime::new(
        "agent-1",
        PlannerAgent::config(),
        llm.clone(),
        tools.clone(),
        agents.clone(),
    ));
    let executor = ExecutionAgent::new(AgentRuntime::new(
        "agent-1",
        ExecutionAgent::config(),
        llm,
        tools,
        agents,
    ));
    let flow = PlanActFlow::new(&session.id, sessions.clone(), planner, executor);

    let sandbox = FakeSandbox::new();
    let runner = AgentTaskRunner::new(
        &session.id,
        "agent-1",
        "user-1",
        sessions.clone(),
        files.clone(),
        sandbox.clone(),
        sandbox.browser(),
        Arc::new(McpTool::new()),
        mcp_config,
        flow,
    );

    RunnerFixture {
        runner,
        sessions,
        files,
        sandbox,
        session,
        _storage_dir: storage_dir,
    }
}

#[tokio::test]
async fn sync_to_storage_registers_the_file_once() {
    let fixture = build_runner().await;
    fixture
        .sandbox
        .files
        .lock()
        .await
        .insert("/home/ubuntu/out.md".into(), b"# report".to_vec());

    let info = fixture
        .runner
        .sync_file_to_storage("/home/ubuntu/out.md")
        .await
        .expect("sync succeeds");
    assert_eq!(info.file_path.as_deref(), Some("/home/ubuntu/out.md"));
    assert_eq!(info.filename, "out.md");

    let session = fixture
        .sessions
        .find_by_id(&fixture.session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.files.len(), 1);

    let (data, _) = fixture
        .files
        .download_file(&info.file_id, "user-1")
        .await
        .unwrap();
    assert_eq!(data, b"# report");
}

#[tokio::test]
async fn resyncing_a_path_replaces_the_prior_copy() {
    let fixture = build_runner().await;
    fixture
        .sandbox
        .files
        .lock()
        .await
        .insert("/home/ubuntu/out.md".into(), b"v1".to_vec());

    let first = fixture
        .runner
        .sync_file_to_storage("/home/ubuntu/out.md")
        .await
        .unwrap();

    fixture
        .sandbox
        .files
        .lock()
        .await
        .insert("/home/ubuntu/out.md".into(), b"v2".to_vec());
    let second = fixture
        .runner
        .sync_file_to_storage("/home/ubuntu/out.md")
        .await
        .unwrap();

    assert_ne!(first.file_id, second.file_id);

    // One FileInfo per path in the session
    let session = fixture
        .sessions
        .find_by_id(&fixture.session.id)
        .await
        .unwrap()
        .unwrap();
    let matching: Vec<_> = session
        .files
        .iter()
        .filter(|file| file.file_path.as_deref() == Some("/home/ubuntu/out.md"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].file_id, second.file_id);

    // The first storage object is gone, the second readable
    assert!(fixture
        .files
        .download_file(&first.file_id, "user-1")
        .await
        .is_err());
    let (data, _) = fixture
        .files
        .download_file(&second.file_id, "user-1")
        .await
        .unwrap();
    assert_eq!(data, b"v2");
}

#[tokio::test]
async fn sync_to_sandbox_places_uploads_under_the_upload_dir() {
    let fixture = build_runner().await;
    let stored = fixture
        .files
        .upload_file(b"attached bytes".to_vec(), "notes.txt", "user-1")
        .await
        .unwrap();

    let info = fixture
        .runner
        .sync_file_to_sandbox(&stored.file_id)
        .await
        .expect("sync succeeds");
    assert_eq!(info.file_path.as_deref(), Some("/home/ubuntu/upload/notes.txt"));

    let files = fixture.sandbox.files.lock().await;
    assert_eq!(
        files.get("/home/ubuntu/upload/notes.txt").unwrap().as_slice(),
        b"attached bytes"
    );
}
