//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde_json::Value;

use super::{ChatMessage, ChatResponse, Llm, ResponseFormat, ToolCallRequest};
use crate::config::LlmSettings;
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model_name: settings.model_name.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn build_body(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        format: ResponseFormat,
    ) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|msg| {
                let mut obj = serde_json::json!({
                    "role": msg.role,
                    "content": msg.content.clone().map(Value::String).unwrap_or(Value::Null),
                });
                if let Some(tool_calls) = &msg.tool_calls {
                    obj["tool_calls"] = tool_calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": serde_json::to_string(&tc.arguments)
                                        .unwrap_or_default(),
                                }
                            })
                        })
                        .collect();
                }
                if let Some(tool_call_id) = &msg.tool_call_id {
                    obj["tool_call_id"] = Value::String(tool_call_id.clone());
                }
                obj
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model_name,
            "messages": wire_messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = Value::String("auto".into());
        }
        if format == ResponseFormat::JsonObject {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }

    fn parse_tool_calls(message: &Value) -> Vec<ToolCallRequest> {
        let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        calls
            .iter()
            .filter_map(|call| {
                let id = call.get("id")?.as_str()?.to_string();
                let function = call.get("function")?;
                let name = function.get("name")?.as_str()?.to_string();
                let arguments = function
                    .get("arguments")
                    .and_then(|args| match args {
                        Value::String(raw) => serde_json::from_str(raw).ok(),
                        other => Some(other.clone()),
                    })
                    .unwrap_or_else(|| Value::Object(Default::default()));
                Some(ToolCallRequest {
                    id,
                    name,
                    arguments,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Llm for OpenAiClient {
    async fn ask(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        format: ResponseFormat,
    ) -> Result<ChatResponse> {
        let body = self.build_body(messages, tools, format);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("API error ({status}): {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("invalid response: {e}")))?;

        let message = payload
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| Error::Llm("no choices in response".into()))?;

        let content = message
            .get("content")
            .and_then(|content| content.as_str())
            .unwrap_or_default()
            .to_string();
        let tool_calls = Self::parse_tool_calls(message);

        Ok(ChatResponse {
            content,
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(&LlmSettings {
            api_key: "key".into(),
            api_base: "https://example.invalid/v1/".into(),
            model_name: "test-model".into(),
            temperature: 0.7,
            max_tokens: 1024,
        })
    }

    #[test]
    fn test_build_body_with_tools_and_format() {
        let client = client();
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let tools = vec![serde_json::json!({"type": "function", "function": {"name": "t"}})];
        let body = client.build_body(&messages, &tools, ResponseFormat::JsonObject);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_tool_calls_with_string_arguments() {
        let message = serde_json::json!({
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "shell_exec", "arguments": "{\"command\": \"ls\"}"}
            }]
        });
        let calls = OpenAiClient::parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "shell_exec");
        assert_eq!(calls[0].arguments["command"], "ls");
    }

    #[test]
    fn test_parse_tool_calls_tolerates_garbage() {
        let message = serde_json::json!({
            "tool_calls": [{"id": "x", "function": {"name": "f", "arguments": "not json"}}]
        });
        let calls = OpenAiClient::parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.is_object());
    }
}
