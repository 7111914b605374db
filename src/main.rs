//! opspilot server binary

use std::sync::Arc;

use opspilot::config::Settings;
use opspilot::database::Database;
use opspilot::llm::OpenAiClient;
use opspilot::queue::RedisStreamQueue;
use opspilot::sandbox::HttpSandboxManager;
use opspilot::server::{self, AppState};
use opspilot::services::{AgentService, NodeService, TicketService, UrlSigner};
use opspilot::store::{
    AgentStore, FileStorage, McpConfigRepository, NodeStore, SessionStore, TicketStore,
};
use opspilot::task::TaskRegistry;
use opspilot::tools::build_search_engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings = Arc::new(Settings::from_env()?);

    // Storage
    let database = Database::new(&settings.sqlite_path).await?;
    database.initialize().await?;
    let pool = database.pool().clone();

    let sessions = SessionStore::new(pool.clone());
    let agents = AgentStore::new(pool.clone());
    let nodes = NodeStore::new(pool.clone());
    let tickets = TicketStore::new(pool.clone());
    let files = FileStorage::new(pool.clone(), &settings.file_storage_path);
    let mcp_config = McpConfigRepository::new(&settings.mcp_config_path);

    // Redis-backed task streams
    let redis_client = redis::Client::open(settings.redis.url())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    let registry = TaskRegistry::new(Arc::new(
        move |stream_name: &str| -> Arc<dyn opspilot::queue::MessageQueue> {
            Arc::new(RedisStreamQueue::new(stream_name, redis_conn.clone()))
        },
    ));

    // External adapters
    let llm = Arc::new(OpenAiClient::new(&settings.llm));
    let sandboxes = Arc::new(HttpSandboxManager::new(settings.sandbox.clone())?);
    let search_engine = build_search_engine(&settings.search);
    let signer = UrlSigner::new(&settings.auth.jwt_secret_key);

    // Services
    let node_service = Arc::new(NodeService::new(nodes, sessions.clone()));
    let agent_service = Arc::new(AgentService::new(
        llm,
        agents,
        sessions,
        files,
        tickets.clone(),
        node_service.clone(),
        sandboxes,
        registry,
        mcp_config,
        search_engine,
        signer,
    ));
    let ticket_service = Arc::new(TicketService::new(tickets, agent_service.clone()));

    let state = AppState {
        agent_service: agent_service.clone(),
        node_service,
        ticket_service,
        settings: settings.clone(),
    };

    server::run(state, &settings.host, settings.port).await?;

    // Graceful teardown: cancel running tasks within the 30s budget
    agent_service.shutdown().await;

    Ok(())
}
