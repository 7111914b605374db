//! Application services
//!
//! The coordinator (`AgentService`), the SSH/node subsystem, the ticket
//! dispatcher, URL signing, and the SSH executor. Services own the stores
//! and the task registry; the HTTP layer only ever talks to services.

pub mod agent_service;
pub mod node_service;
pub mod signing;
pub mod ssh;
pub mod ticket_service;

pub use agent_service::AgentService;
pub use node_service::{NodePayload, NodeService};
pub use signing::UrlSigner;
pub use ticket_service::{TicketPayload, TicketService};
