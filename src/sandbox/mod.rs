//! Sandbox and browser adapter interfaces
//!
//! The sandbox vendor is external: the core only depends on these traits.
//! The HTTP implementation talks to a sandbox supervisor that manages
//! per-session containers with a shell, a filesystem, and a headless
//! browser behind a VNC endpoint.

mod http;

pub use http::{HttpSandbox, HttpSandboxManager};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::ToolResult;

/// One isolated execution environment owned by a session
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    /// VNC endpoint for watching the sandbox browser
    fn vnc_url(&self) -> String;

    /// Make sure the environment is running (idempotent)
    async fn ensure(&self) -> Result<()>;

    /// Run a command inside a named shell session
    async fn exec_shell(
        &self,
        shell_id: &str,
        exec_dir: Option<&str>,
        command: &str,
    ) -> Result<ToolResult>;

    /// Console buffer of a shell session
    async fn view_shell(&self, shell_id: &str) -> Result<ToolResult>;

    /// Wait for a running command in a shell session
    async fn wait_shell(&self, shell_id: &str, seconds: u64) -> Result<ToolResult>;

    async fn file_read(&self, path: &str) -> Result<ToolResult>;

    async fn file_write(&self, path: &str, content: &str, append: bool) -> Result<ToolResult>;

    /// Write raw bytes into the sandbox filesystem
    async fn file_upload(&self, data: Vec<u8>, path: &str) -> Result<ToolResult>;

    /// Read raw bytes from the sandbox filesystem
    async fn file_download(&self, path: &str) -> Result<Vec<u8>>;

    /// Browser handle living inside this sandbox
    fn browser(&self) -> Arc<dyn Browser>;

    /// Tear down the environment and release its resources
    async fn destroy(&self) -> Result<()>;
}

/// Headless browser controls
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<ToolResult>;

    /// Visible page content plus interactive element index
    async fn view_page(&self) -> Result<ToolResult>;

    async fn click(&self, selector: &str) -> Result<ToolResult>;

    async fn input(&self, selector: &str, text: &str) -> Result<ToolResult>;

    async fn scroll(&self, direction: &str) -> Result<ToolResult>;

    /// PNG screenshot of the current page
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// Factory resolving sandboxes by id and creating new ones
#[async_trait]
pub trait SandboxManager: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Sandbox>>;

    async fn get(&self, sandbox_id: &str) -> Result<Option<Arc<dyn Sandbox>>>;
}
