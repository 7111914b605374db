//! Planner agent

use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::json::parse_json_response;
use super::prompts::{
    render, CREATE_PLAN_PROMPT, PLANNER_SYSTEM_PROMPT, SYSTEM_PROMPT, UPDATE_PLAN_PROMPT,
};
use super::{AgentConfig, AgentRuntime};
use crate::llm::ResponseFormat;
use crate::models::{AgentEvent, PlanEventStatus, Step, UserMessage};
use crate::models::{ExecutionStatus, Plan};

#[derive(Debug, Deserialize)]
struct CreatePlanResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    steps: Vec<PlanStepPayload>,
    #[serde(default)]
    goal: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct PlanStepPayload {
    id: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct UpdatePlanResponse {
    #[serde(default)]
    steps: Vec<PlanStepPayload>,
}

/// Creates and maintains the plan driving one task
pub struct PlannerAgent {
    runtime: AgentRuntime,
}

impl PlannerAgent {
    pub const MEMORY_NAME: &'static str = "planner";

    pub fn config() -> AgentConfig {
        AgentConfig::new(
            Self::MEMORY_NAME,
            format!("{SYSTEM_PROMPT}{PLANNER_SYSTEM_PROMPT}"),
            ResponseFormat::JsonObject,
        )
    }

    pub fn new(runtime: AgentRuntime) -> Self {
        Self { runtime }
    }

    pub async fn roll_back(&self) -> crate::error::Result<()> {
        self.runtime.roll_back().await
    }

    /// One planning turn: forwards runtime events and converts the final
    /// model answer into a `Plan{Created}` event.
    pub fn create_plan<'a>(
        &'a self,
        message: &'a UserMessage,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'a>> {
        Box::pin(stream! {
            let prompt = render(
                CREATE_PLAN_PROMPT,
                &[
                    ("message", &message.message),
                    ("attachments", &message.attachments.join("\n")),
                ],
            );

            let mut inner = self.runtime.execute(prompt);
            while let Some(event) = inner.next().await {
                match event {
                    AgentEvent::Message { message: content, .. } => {
                        match parse_json_response::<CreatePlanResponse>(&content) {
                            Ok(response) => {
                                let plan = Plan {
                                    title: response.title,
                                    goal: response.goal,
                                    message: response.message,
                                    language: response.language,
                                    steps: response
                                        .steps
                                        .into_iter()
                                        .map(|step| Step {
                                            id: step.id,
                                            description: step.description,
                                            ..Default::default()
                                        })
                                        .collect(),
                                    status: ExecutionStatus::Pending,
                                };
                                yield AgentEvent::plan(plan, PlanEventStatus::Created);
                            }
                            Err(err) => {
                                yield AgentEvent::error(format!("Plan response invalid: {err}"));
                            }
                        }
                    }
                    other => yield other,
                }
            }
        })
    }

    /// Re-plan the uncompleted tail after a step finished. Completed steps
    /// and untouched descriptions survive verbatim.
    pub fn update_plan<'a>(
        &'a self,
        plan: &'a Plan,
        last_step: &'a Step,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'a>> {
        Box::pin(stream! {
            let step_json = serde_json::to_string(last_step).unwrap_or_default();
            let plan_json = serde_json::to_string(plan).unwrap_or_default();
            let prompt = render(
                UPDATE_PLAN_PROMPT,
                &[("step", step_json.as_str()), ("plan", plan_json.as_str())],
            );

            let mut inner = self.runtime.execute(prompt);
            while let Some(event) = inner.next().await {
                match event {
                    AgentEvent::Message { message: content, .. } => {
                        match parse_json_response::<UpdatePlanResponse>(&content) {
                            Ok(response) => {
                                let mut updated = plan.clone();
                                updated.merge_updated_steps(
                                    response
                                        .steps
                                        .into_iter()
                                        .map(|step| Step {
                                            id: step.id,
                                            description: step.description,
                                            ..Default::default()
                                        })
                                        .collect(),
                                );
                                yield AgentEvent::Plan {
                                    meta: Default::default(),
                                    plan: updated,
                                    status: PlanEventStatus::Updated,
                                    step: Some(last_step.clone()),
                                };
                            }
                            Err(err) => {
                                // Keep the current plan; the flow continues
                                // with the next pending step.
                                tracing::warn!(error = %err, "Plan update response invalid");
                                yield AgentEvent::Plan {
                                    meta: Default::default(),
                                    plan: plan.clone(),
                                    status: PlanEventStatus::Updated,
                                    step: Some(last_step.clone()),
                                };
                            }
                        }
                    }
                    other => yield other,
                }
            }
        })
    }
}
