//! Domain models
//!
//! Plain data types shared across the stores, the flow, the tools, and the
//! HTTP surface. Sessions own their event and file sequences; everything is
//! serde-serializable because sessions and tickets persist as JSON columns.

pub mod agent;
pub mod event;
pub mod file;
pub mod message;
pub mod node;
pub mod plan;
pub mod search;
pub mod session;
pub mod ticket;
pub mod user;

pub use agent::{Agent, Memory};
pub use event::{
    AgentEvent, EventMeta, MessageRole, PlanEventStatus, StepEventStatus, ToolContent, ToolStatus,
};
pub use file::FileInfo;
pub use message::UserMessage;
pub use node::{SshApprovalStatus, SshAuthType, SshCommandApproval, SshNode, SshOperationLog};
pub use plan::{ExecutionStatus, Plan, Step};
pub use search::{SearchResultItem, SearchResults};
pub use session::{Session, SessionStatus, SessionType};
pub use ticket::{
    Ticket, TicketComment, TicketCommentRole, TicketEvent, TicketEventType, TicketPriority,
    TicketStatus, TicketUrgency,
};
pub use user::{User, UserRole};

/// Short random identifier used for sessions, nodes, approvals and the like
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Shorter identifier used for ticket records
pub fn tiny_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(tiny_id().len(), 12);
    }
}
