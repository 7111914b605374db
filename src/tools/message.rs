//! Message tool surfacing agent text to the user
//!
//! Both functions are pure signals: the execution agent intercepts their
//! tool events to emit assistant messages and, for `message_ask_user`,
//! suspend the flow until the user answers.

use async_trait::async_trait;
use serde_json::Value;

use super::{require_str, Tool, ToolFunction, ToolResult};

pub struct MessageTool;

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn functions(&self) -> Vec<ToolFunction> {
        vec![
            ToolFunction::new(
                "message_notify_user",
                "Notify the user about progress within one sentence. Does not wait for a reply.",
                serde_json::json!({
                    "text": {"type": "string", "description": "Message to show the user"},
                }),
                &["text"],
            ),
            ToolFunction::new(
                "message_ask_user",
                "Ask the user for input or confirmation. The task pauses until the user replies.",
                serde_json::json!({
                    "text": {"type": "string", "description": "Question for the user"},
                }),
                &["text"],
            ),
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> ToolResult {
        let text = match require_str(args, "text") {
            Ok(text) => text,
            Err(failure) => return failure,
        };
        match function_name {
            "message_notify_user" => ToolResult::ok(serde_json::json!({"text": text})),
            "message_ask_user" => ToolResult::ok(serde_json::json!({"text": text, "waiting": true})),
            other => ToolResult::fail(format!("Unknown message function: {other}")),
        }
    }
}
