//! opspilot - AI operations agent backend
//!
//! The execution core of a conversational operations agent: durable
//! per-session event streams, a plan-act flow over planner and executor
//! LLM roles, a tool dispatch layer (sandbox shell/browser/files, web
//! search, SSH nodes with approval, tickets, MCP servers), and the session
//! store every other component writes through.

pub mod agents;
pub mod config;
pub mod database;
pub mod error;
pub mod flow;
pub mod llm;
pub mod models;
pub mod queue;
pub mod sandbox;
pub mod server;
pub mod services;
pub mod store;
pub mod task;
pub mod tools;

// Re-export main types
pub use config::Settings;
pub use database::Database;
pub use error::{Error, Result};
pub use flow::PlanActFlow;
pub use services::{AgentService, NodeService, TicketService};
pub use task::{AgentTaskRunner, TaskHandle, TaskRegistry};
