//! HTTP sandbox supervisor client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use super::{Browser, Sandbox, SandboxManager};
use crate::config::SandboxSettings;
use crate::error::{Error, Result};
use crate::tools::ToolResult;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Talks to the sandbox supervisor's management API
#[derive(Clone)]
pub struct HttpSandboxManager {
    client: reqwest::Client,
    address: String,
    settings: SandboxSettings,
}

impl HttpSandboxManager {
    pub fn new(settings: SandboxSettings) -> Result<Self> {
        let address = settings
            .address
            .clone()
            .ok_or_else(|| Error::Configuration("SANDBOX_ADDRESS is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            address: address.trim_end_matches('/').to_string(),
            settings,
        })
    }
}

#[async_trait]
impl SandboxManager for HttpSandboxManager {
    async fn create(&self) -> Result<Arc<dyn Sandbox>> {
        let body = serde_json::json!({
            "image": self.settings.image,
            "name_prefix": self.settings.name_prefix,
            "ttl_minutes": self.settings.ttl_minutes,
            "network": self.settings.network,
            "chrome_args": self.settings.chrome_args,
            "http_proxy": self.settings.http_proxy,
            "https_proxy": self.settings.https_proxy,
            "no_proxy": self.settings.no_proxy,
        });
        let response: Value = self
            .client
            .post(format!("{}/sandboxes", self.address))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Sandbox(format!("create failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Sandbox(format!("create rejected: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Sandbox(format!("create response invalid: {e}")))?;

        let sandbox_id = response
            .get("sandbox_id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| Error::Sandbox("create response missing sandbox_id".into()))?;

        tracing::info!(sandbox_id, "Sandbox created");
        Ok(Arc::new(HttpSandbox {
            client: self.client.clone(),
            address: self.address.clone(),
            id: sandbox_id.to_string(),
        }))
    }

    async fn get(&self, sandbox_id: &str) -> Result<Option<Arc<dyn Sandbox>>> {
        let response = self
            .client
            .get(format!("{}/sandboxes/{}", self.address, sandbox_id))
            .send()
            .await
            .map_err(|e| Error::Sandbox(format!("lookup failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response
            .error_for_status_ref()
            .map_err(|e| Error::Sandbox(format!("lookup rejected: {e}")))?;

        Ok(Some(Arc::new(HttpSandbox {
            client: self.client.clone(),
            address: self.address.clone(),
            id: sandbox_id.to_string(),
        })))
    }
}

/// One running sandbox reached through the supervisor
pub struct HttpSandbox {
    client: reqwest::Client,
    address: String,
    id: String,
}

impl HttpSandbox {
    fn url(&self, path: &str) -> String {
        format!("{}/sandboxes/{}/{}", self.address, self.id, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<ToolResult> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Sandbox(format!("{path}: {e}")))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Sandbox(format!("{path}: invalid response: {e}")))?;

        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("sandbox call failed");
            return Ok(ToolResult::fail(message));
        }
        Ok(ToolResult::ok(payload))
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn vnc_url(&self) -> String {
        format!("{}/sandboxes/{}/vnc", self.address, self.id)
    }

    async fn ensure(&self) -> Result<()> {
        self.client
            .post(self.url("ensure"))
            .send()
            .await
            .map_err(|e| Error::Sandbox(format!("ensure: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Sandbox(format!("ensure rejected: {e}")))?;
        Ok(())
    }

    async fn exec_shell(
        &self,
        shell_id: &str,
        exec_dir: Option<&str>,
        command: &str,
    ) -> Result<ToolResult> {
        self.post_json(
            "shell/exec",
            serde_json::json!({"id": shell_id, "exec_dir": exec_dir, "command": command}),
        )
        .await
    }

    async fn view_shell(&self, shell_id: &str) -> Result<ToolResult> {
        self.post_json(
            "shell/view",
            serde_json::json!({"id": shell_id, "console": true}),
        )
        .await
    }

    async fn wait_shell(&self, shell_id: &str, seconds: u64) -> Result<ToolResult> {
        self.post_json(
            "shell/wait",
            serde_json::json!({"id": shell_id, "seconds": seconds}),
        )
        .await
    }

    async fn file_read(&self, path: &str) -> Result<ToolResult> {
        self.post_json("file/read", serde_json::json!({"file": path})).await
    }

    async fn file_write(&self, path: &str, content: &str, append: bool) -> Result<ToolResult> {
        self.post_json(
            "file/write",
            serde_json::json!({"file": path, "content": content, "append": append}),
        )
        .await
    }

    async fn file_upload(&self, data: Vec<u8>, path: &str) -> Result<ToolResult> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        self.post_json(
            "file/upload",
            serde_json::json!({"file": path, "data": encoded}),
        )
        .await
    }

    async fn file_download(&self, path: &str) -> Result<Vec<u8>> {
        let result = self
            .post_json("file/download", serde_json::json!({"file": path}))
            .await?;
        let encoded = result
            .data
            .as_ref()
            .and_then(|data| data.get("data"))
            .and_then(|data| data.as_str())
            .ok_or_else(|| Error::Sandbox(format!("download of {path} returned no data")))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Sandbox(format!("download of {path} not base64: {e}")))
    }

    fn browser(&self) -> Arc<dyn Browser> {
        Arc::new(HttpBrowser {
            client: self.client.clone(),
            address: self.address.clone(),
            sandbox_id: self.id.clone(),
        })
    }

    async fn destroy(&self) -> Result<()> {
        let result = self
            .client
            .delete(format!("{}/sandboxes/{}", self.address, self.id))
            .send()
            .await;
        if let Err(err) = result {
            tracing::warn!(sandbox_id = %self.id, error = %err, "Sandbox destroy failed");
        }
        Ok(())
    }
}

struct HttpBrowser {
    client: reqwest::Client,
    address: String,
    sandbox_id: String,
}

impl HttpBrowser {
    async fn post_json(&self, path: &str, body: Value) -> Result<ToolResult> {
        let url = format!(
            "{}/sandboxes/{}/browser/{}",
            self.address, self.sandbox_id, path
        );
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Sandbox(format!("browser {path}: {e}")))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Sandbox(format!("browser {path}: invalid response: {e}")))?;
        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("browser call failed");
            return Ok(ToolResult::fail(message));
        }
        Ok(ToolResult::ok(payload))
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn navigate(&self, url: &str) -> Result<ToolResult> {
        self.post_json("navigate", serde_json::json!({"url": url})).await
    }

    async fn view_page(&self) -> Result<ToolResult> {
        self.post_json("view", serde_json::json!({})).await
    }

    async fn click(&self, selector: &str) -> Result<ToolResult> {
        self.post_json("click", serde_json::json!({"selector": selector}))
            .await
    }

    async fn input(&self, selector: &str, text: &str) -> Result<ToolResult> {
        self.post_json("input", serde_json::json!({"selector": selector, "text": text}))
            .await
    }

    async fn scroll(&self, direction: &str) -> Result<ToolResult> {
        self.post_json("scroll", serde_json::json!({"direction": direction}))
            .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self.post_json("screenshot", serde_json::json!({})).await?;
        let encoded = result
            .data
            .as_ref()
            .and_then(|data| data.get("data"))
            .and_then(|data| data.as_str())
            .ok_or_else(|| Error::Sandbox("screenshot returned no data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Sandbox(format!("screenshot not base64: {e}")))
    }
}
