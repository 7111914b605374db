//! Execution agent

use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::json::parse_json_response;
use super::prompts::{
    render, EXECUTION_PROMPT, EXECUTION_SYSTEM_PROMPT, SUMMARIZE_PROMPT, SYSTEM_PROMPT,
};
use super::{AgentConfig, AgentRuntime};
use crate::llm::ResponseFormat;
use crate::models::{
    AgentEvent, EventMeta, ExecutionStatus, FileInfo, MessageRole, Plan, Step, StepEventStatus,
    ToolStatus, UserMessage,
};

#[derive(Debug, Deserialize)]
struct StepResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    attachments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    attachments: Vec<String>,
}

/// Runs plan steps through the tool loop
pub struct ExecutionAgent {
    runtime: AgentRuntime,
}

impl ExecutionAgent {
    pub const MEMORY_NAME: &'static str = "execution";

    pub fn config() -> AgentConfig {
        AgentConfig::new(
            Self::MEMORY_NAME,
            format!("{SYSTEM_PROMPT}{EXECUTION_SYSTEM_PROMPT}"),
            ResponseFormat::JsonObject,
        )
    }

    pub fn new(runtime: AgentRuntime) -> Self {
        Self { runtime }
    }

    pub async fn roll_back(&self) -> crate::error::Result<()> {
        self.runtime.roll_back().await
    }

    pub async fn compact_memory(&self) -> crate::error::Result<()> {
        self.runtime.compact_memory().await
    }

    /// Execute one step. The final event sequence carries the mutated step;
    /// the flow writes it back into its plan.
    ///
    /// Two tool branches suspend the flow instead of finishing the step:
    /// `message_ask_user` (after the call completes) and an `ssh_node_exec`
    /// that came back `approval_required`. Both yield a Wait and end the
    /// stream immediately.
    pub fn execute_step<'a>(
        &'a self,
        plan: Plan,
        step: Step,
        message: &'a UserMessage,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'a>> {
        Box::pin(stream! {
            let prompt = render(
                EXECUTION_PROMPT,
                &[
                    ("step", &step.description),
                    ("message", &message.message),
                    ("attachments", &message.attachments.join("\n")),
                    ("language", &plan.language),
                ],
            );

            let mut step = step;
            step.status = ExecutionStatus::Running;
            yield AgentEvent::step(step.clone(), StepEventStatus::Started);

            let mut inner = self.runtime.execute(prompt);
            while let Some(event) = inner.next().await {
                match event {
                    AgentEvent::Error { error, .. } => {
                        step.status = ExecutionStatus::Failed;
                        step.error = Some(error);
                        yield AgentEvent::step(step.clone(), StepEventStatus::Failed);
                    }
                    AgentEvent::Message { message: content, .. } => {
                        match parse_json_response::<StepResponse>(&content) {
                            Ok(response) => {
                                step.status = ExecutionStatus::Completed;
                                step.success = Some(response.success);
                                step.result = (!response.result.is_empty())
                                    .then(|| response.result.clone());
                                step.attachments =
                                    (!response.attachments.is_empty()).then(|| response.attachments);
                                yield AgentEvent::step(step.clone(), StepEventStatus::Completed);
                                if let Some(result) = &step.result {
                                    yield AgentEvent::message(result.clone());
                                }
                            }
                            Err(err) => {
                                step.status = ExecutionStatus::Failed;
                                step.error = Some(format!("Step response invalid: {err}"));
                                yield AgentEvent::step(step.clone(), StepEventStatus::Failed);
                            }
                        }
                    }
                    AgentEvent::Tool {
                        meta,
                        tool_call_id,
                        tool_name,
                        function_name,
                        function_args,
                        status,
                        function_result,
                        tool_content,
                    } => {
                        if function_name == "message_ask_user" {
                            match status {
                                ToolStatus::Calling => {
                                    let text = function_args
                                        .get("text")
                                        .and_then(|text| text.as_str())
                                        .unwrap_or_default();
                                    yield AgentEvent::message(text);
                                }
                                ToolStatus::Called => {
                                    yield AgentEvent::wait();
                                    return;
                                }
                            }
                            continue;
                        }

                        let approval_pending = function_name == "ssh_node_exec"
                            && status == ToolStatus::Called
                            && function_result
                                .as_ref()
                                .map(|result| result.message == "approval_required")
                                .unwrap_or(false);

                        yield AgentEvent::Tool {
                            meta,
                            tool_call_id,
                            tool_name,
                            function_name,
                            function_args,
                            status,
                            function_result,
                            tool_content,
                        };

                        if approval_pending {
                            yield AgentEvent::message(
                                "The SSH command is waiting for your approval. \
                                 I will continue once you decide.",
                            );
                            yield AgentEvent::wait();
                            return;
                        }
                    }
                    other => yield other,
                }
            }
        })
    }

    /// Final turn: the model's summary becomes one message with file-path
    /// attachments resolved to FileInfo placeholders for the task runner.
    pub fn summarize(&self) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send + '_>> {
        Box::pin(stream! {
            let mut inner = self.runtime.execute(SUMMARIZE_PROMPT.to_string());
            while let Some(event) = inner.next().await {
                match event {
                    AgentEvent::Message { message: content, .. } => {
                        match parse_json_response::<SummaryResponse>(&content) {
                            Ok(response) => {
                                let attachments: Vec<FileInfo> = response
                                    .attachments
                                    .iter()
                                    .map(FileInfo::from_path)
                                    .collect();
                                yield AgentEvent::Message {
                                    meta: EventMeta::default(),
                                    role: MessageRole::Assistant,
                                    message: response.message,
                                    attachments: (!attachments.is_empty()).then_some(attachments),
                                };
                            }
                            Err(err) => {
                                yield AgentEvent::error(format!("Summary response invalid: {err}"));
                            }
                        }
                    }
                    other => yield other,
                }
            }
        })
    }
}
