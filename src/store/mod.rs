//! Persistence layer
//!
//! One store per aggregate, all over the shared SQLite pool. The session
//! store is the single source of truth the task runner writes to and the
//! streaming endpoints replay from; every store serializes updates to one
//! document through the database.

pub mod agents;
pub mod files;
pub mod mcp;
pub mod nodes;
pub mod sessions;
pub mod tickets;
pub mod users;

pub use agents::AgentStore;
pub use files::FileStorage;
pub use mcp::{McpConfig, McpConfigRepository, McpServerConfig};
pub use nodes::NodeStore;
pub use sessions::SessionStore;
pub use tickets::TicketStore;
pub use users::UserStore;

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 column value, tolerating NULL
pub(crate) fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| v.parse::<DateTime<Utc>>().ok())
}

/// Parse a required RFC 3339 column value, defaulting to now on corruption
pub(crate) fn parse_ts_or_now(value: String) -> DateTime<Utc> {
    value.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
}
