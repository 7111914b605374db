//! Browser tool driving the sandbox's headless browser

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{require_str, Tool, ToolFunction, ToolResult};
use crate::sandbox::Browser;

pub struct BrowserTool {
    browser: Arc<dyn Browser>,
}

impl BrowserTool {
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![
            ToolFunction::new(
                "browser_navigate",
                "Open a URL in the sandbox browser.",
                serde_json::json!({
                    "url": {"type": "string", "description": "Absolute URL to open"},
                }),
                &["url"],
            ),
            ToolFunction::new(
                "browser_view",
                "Read the visible content and interactive elements of the current page.",
                serde_json::json!({}),
                &[],
            ),
            ToolFunction::new(
                "browser_click",
                "Click an element on the current page.",
                serde_json::json!({
                    "selector": {"type": "string", "description": "CSS selector or element index"},
                }),
                &["selector"],
            ),
            ToolFunction::new(
                "browser_input",
                "Type text into an element on the current page.",
                serde_json::json!({
                    "selector": {"type": "string", "description": "CSS selector or element index"},
                    "text": {"type": "string", "description": "Text to type"},
                }),
                &["selector", "text"],
            ),
            ToolFunction::new(
                "browser_scroll",
                "Scroll the current page.",
                serde_json::json!({
                    "direction": {"type": "string", "enum": ["up", "down"]},
                }),
                &["direction"],
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        let result = match function_name {
            "browser_navigate" => match require_str(args, "url") {
                Ok(url) => self.browser.navigate(url).await,
                Err(failure) => return failure,
            },
            "browser_view" => self.browser.view_page().await,
            "browser_click" => match require_str(args, "selector") {
                Ok(selector) => self.browser.click(selector).await,
                Err(failure) => return failure,
            },
            "browser_input" => {
                let selector = match require_str(args, "selector") {
                    Ok(selector) => selector,
                    Err(failure) => return failure,
                };
                match require_str(args, "text") {
                    Ok(text) => self.browser.input(selector, text).await,
                    Err(failure) => return failure,
                }
            }
            "browser_scroll" => {
                let direction = args
                    .get("direction")
                    .and_then(|d| d.as_str())
                    .unwrap_or("down");
                self.browser.scroll(direction).await
            }
            other => return ToolResult::fail(format!("Unknown browser function: {other}")),
        };

        result.unwrap_or_else(|err| ToolResult::fail(err.to_string()))
    }
}
