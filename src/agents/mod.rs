//! LLM-driven agents
//!
//! Two roles share one runtime: a named memory slot on the session's Agent
//! row, a tool loop that interleaves model turns with tool invocations, and
//! a size-bounded memory compaction policy. The planner and executor wrap
//! the runtime with their role-specific prompts and event mappings.

pub mod execution;
pub mod json;
pub mod planner;
pub mod prompts;

pub use execution::ExecutionAgent;
pub use planner::PlannerAgent;

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde_json::Value;

use crate::error::Result;
use crate::llm::{ChatMessage, Llm, ResponseFormat};
use crate::models::{AgentEvent, EventMeta, Memory, ToolStatus};
use crate::store::AgentStore;
use crate::tools::ToolSet;

/// Character budget approximating one token
const CHARS_PER_TOKEN: usize = 4;

/// Role-specific agent configuration
#[derive(Clone)]
pub struct AgentConfig {
    /// Memory slot name on the Agent row
    pub name: String,
    pub system_prompt: String,
    pub format: ResponseFormat,
    /// Compaction kicks in above this estimated prompt size
    pub token_ceiling: usize,
    /// Most recent user exchanges preserved verbatim by compaction
    pub keep_recent_exchanges: usize,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, system_prompt: String, format: ResponseFormat) -> Self {
        Self {
            name: name.into(),
            system_prompt,
            format,
            token_ceiling: 24_000,
            keep_recent_exchanges: 3,
        }
    }
}

/// Memory-backed tool loop shared by the planner and executor roles
pub struct AgentRuntime {
    agent_id: String,
    config: AgentConfig,
    llm: Arc<dyn Llm>,
    tools: ToolSet,
    agents: AgentStore,
}

impl AgentRuntime {
    pub fn new(
        agent_id: impl Into<String>,
        config: AgentConfig,
        llm: Arc<dyn Llm>,
        tools: ToolSet,
        agents: AgentStore,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            config,
            llm,
            tools,
            agents,
        }
    }

    pub fn memory_name(&self) -> &str {
        &self.config.name
    }

    async fn load_memory(&self) -> Result<Memory> {
        let mut memory = self.agents.get_memory(&self.agent_id, &self.config.name).await?;
        if memory.messages.is_empty() {
            memory
                .messages
                .push(ChatMessage::system(self.config.system_prompt.clone()));
        }
        Ok(memory)
    }

    async fn save_memory(&self, memory: &Memory) {
        if let Err(err) = self
            .agents
            .save_memory(&self.agent_id, &self.config.name, memory)
            .await
        {
            tracing::error!(agent_id = %self.agent_id, error = %err, "Failed to persist agent memory");
        }
    }

    /// Run one agent turn over `user_message`, yielding tool events as they
    /// happen and a final message event with the model's answer.
    pub fn execute(
        &self,
        user_message: String,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send + '_>> {
        Box::pin(stream! {
            let mut memory = match self.load_memory().await {
                Ok(memory) => memory,
                Err(err) => {
                    yield AgentEvent::error(format!("Failed to load agent memory: {err}"));
                    return;
                }
            };
            memory.messages.push(ChatMessage::user(user_message));

            loop {
                let response = self
                    .llm
                    .ask(&memory.messages, &self.tools.schemas(), self.config.format)
                    .await;
                let response = match response {
                    Ok(response) => response,
                    Err(err) => {
                        yield AgentEvent::error(format!("LLM call failed: {err}"));
                        return;
                    }
                };

                if response.tool_calls.is_empty() {
                    memory.messages.push(ChatMessage::assistant(response.content.clone()));
                    self.save_memory(&memory).await;
                    yield AgentEvent::message(response.content);
                    return;
                }

                memory.messages.push(ChatMessage::assistant_tool_calls(
                    (!response.content.is_empty()).then(|| response.content.clone()),
                    response.tool_calls.clone(),
                ));

                for call in response.tool_calls {
                    let mut args = call.arguments.clone();
                    if call.name == "ssh_node_exec" {
                        // Ties the approval record back to this call
                        if let Some(map) = args.as_object_mut() {
                            map.insert("tool_call_id".into(), Value::String(call.id.clone()));
                        }
                    }

                    let tool_name = self
                        .tools
                        .tool_for(&call.name)
                        .map(|tool| tool.name().to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    yield AgentEvent::Tool {
                        meta: EventMeta::default(),
                        tool_call_id: call.id.clone(),
                        tool_name: tool_name.clone(),
                        function_name: call.name.clone(),
                        function_args: call.arguments.clone(),
                        status: ToolStatus::Calling,
                        function_result: None,
                        tool_content: None,
                    };

                    let (tool_name, result) = self.tools.invoke(&call.name, &args).await;

                    let feedback = serde_json::to_string(&result)
                        .unwrap_or_else(|_| "{\"success\": false}".to_string());
                    memory.messages.push(ChatMessage::tool(call.id.clone(), feedback));

                    yield AgentEvent::Tool {
                        meta: EventMeta::default(),
                        tool_call_id: call.id,
                        tool_name,
                        function_name: call.name,
                        function_args: call.arguments,
                        status: ToolStatus::Called,
                        function_result: Some(result),
                        tool_content: None,
                    };
                }

                self.save_memory(&memory).await;
            }
        })
    }

    /// Drop the last exchange so the same message can re-enter the turn.
    ///
    /// Used on resume: a session that already consumed part of a message
    /// rolls both agents back one turn before re-running it.
    pub async fn roll_back(&self) -> Result<()> {
        let mut memory = self.agents.get_memory(&self.agent_id, &self.config.name).await?;
        let Some(last_user) = memory
            .messages
            .iter()
            .rposition(|message| message.role == "user")
        else {
            return Ok(());
        };
        memory.messages.truncate(last_user);
        self.save_memory(&memory).await;
        Ok(())
    }

    /// Bound the prompt size while keeping the most recent exchanges
    /// verbatim. Older exchanges collapse into one summary marker.
    pub async fn compact_memory(&self) -> Result<()> {
        let mut memory = self.agents.get_memory(&self.agent_id, &self.config.name).await?;
        if estimate_tokens(&memory.messages) <= self.config.token_ceiling {
            return Ok(());
        }

        let compacted = compact_messages(&memory.messages, self.config.keep_recent_exchanges);
        if compacted.len() < memory.messages.len() {
            tracing::debug!(
                agent_id = %self.agent_id,
                before = memory.messages.len(),
                after = compacted.len(),
                "Compacted agent memory"
            );
            memory.messages = compacted;
            self.save_memory(&memory).await;
        }
        Ok(())
    }
}

/// Rough prompt size estimate
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|message| {
            message.content.as_deref().map(str::len).unwrap_or(0)
                + message
                    .tool_calls
                    .as_ref()
                    .map(|calls| {
                        calls
                            .iter()
                            .map(|call| call.arguments.to_string().len() + call.name.len())
                            .sum()
                    })
                    .unwrap_or(0)
        })
        .sum();
    chars / CHARS_PER_TOKEN
}

/// Keep the leading system message and the last `keep_recent` user
/// exchanges; everything in between becomes one summary marker.
fn compact_messages(messages: &[ChatMessage], keep_recent: usize) -> Vec<ChatMessage> {
    let system_end = messages
        .iter()
        .take_while(|message| message.role == "system")
        .count();

    // Boundary sits on a user message so assistant/tool pairs stay intact
    let mut user_seen = 0;
    let mut boundary = messages.len();
    for index in (system_end..messages.len()).rev() {
        if messages[index].role == "user" {
            user_seen += 1;
            boundary = index;
            if user_seen >= keep_recent {
                break;
            }
        }
    }

    if boundary <= system_end {
        return messages.to_vec();
    }

    let elided = boundary - system_end;
    let mut compacted: Vec<ChatMessage> = messages[..system_end].to_vec();
    compacted.push(ChatMessage::user(format!(
        "[{elided} earlier messages from this task were compacted to keep the \
         context small. Continue from the remaining history.]"
    )));
    compacted.extend_from_slice(&messages[boundary..]);
    compacted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(text),
            ChatMessage::assistant(format!("answer to {text}")),
        ]
    }

    #[test]
    fn test_estimate_tokens() {
        let messages = vec![ChatMessage::user("a".repeat(400))];
        assert_eq!(estimate_tokens(&messages), 100);
    }

    #[test]
    fn test_compact_preserves_recent_exchanges_verbatim() {
        let mut messages = vec![ChatMessage::system("sys")];
        for index in 0..10 {
            messages.extend(exchange(&format!("turn {index}")));
        }

        let compacted = compact_messages(&messages, 3);
        assert!(compacted.len() < messages.len());
        assert_eq!(compacted[0].role, "system");
        assert!(compacted[1]
            .content
            .as_deref()
            .unwrap()
            .contains("compacted"));

        // Last three exchanges are byte-identical
        let tail = &messages[messages.len() - 6..];
        let compacted_tail = &compacted[compacted.len() - 6..];
        for (kept, original) in compacted_tail.iter().zip(tail) {
            assert_eq!(kept.content, original.content);
            assert_eq!(kept.role, original.role);
        }
    }

    #[test]
    fn test_compact_noop_when_history_is_short() {
        let mut messages = vec![ChatMessage::system("sys")];
        messages.extend(exchange("only turn"));
        let compacted = compact_messages(&messages, 3);
        assert_eq!(compacted.len(), messages.len());
    }
}
