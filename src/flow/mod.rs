//! Plan-act flow
//!
//! The state machine that drives one user message through the planner and
//! executor. Consumed once per message; every event it yields is forwarded
//! by the task runner into the output stream and the session store.

use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};

use crate::agents::{ExecutionAgent, PlannerAgent};
use crate::models::{
    AgentEvent, ExecutionStatus, Plan, PlanEventStatus, SessionStatus, Step, UserMessage,
};
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Idle,
    Planning,
    Executing,
    Updating,
    Summarizing,
    Completed,
}

pub struct PlanActFlow {
    session_id: String,
    sessions: SessionStore,
    planner: PlannerAgent,
    executor: ExecutionAgent,
    state: FlowState,
}

impl PlanActFlow {
    pub fn new(
        session_id: impl Into<String>,
        sessions: SessionStore,
        planner: PlannerAgent,
        executor: ExecutionAgent,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sessions,
            planner,
            executor,
            state: FlowState::Idle,
        }
    }

    /// Process one user message.
    ///
    /// Entry rules: a non-Pending session rolls both agents back one turn
    /// (resume path); Running resumes in Planning, Waiting resumes in
    /// Executing. A Wait emitted by a step passes through untouched and
    /// ends the run without a Done; the task runner owns the translation
    /// to `status=Waiting`.
    pub fn run(
        &mut self,
        message: UserMessage,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send + '_>> {
        Box::pin(stream! {
            let session = match self.sessions.find_by_id(&self.session_id).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    yield AgentEvent::error(format!("Session {} not found", self.session_id));
                    return;
                }
                Err(err) => {
                    yield AgentEvent::error(format!("Session load failed: {err}"));
                    return;
                }
            };

            if session.status != SessionStatus::Pending {
                tracing::debug!(session_id = %self.session_id, "Resuming session, rolling agents back");
                if let Err(err) = self.executor.roll_back().await {
                    tracing::warn!(error = %err, "Executor rollback failed");
                }
                if let Err(err) = self.planner.roll_back().await {
                    tracing::warn!(error = %err, "Planner rollback failed");
                }
            }

            self.state = match session.status {
                SessionStatus::Waiting => FlowState::Executing,
                SessionStatus::Running => FlowState::Planning,
                _ => FlowState::Idle,
            };

            if let Err(err) = self
                .sessions
                .update_status(&self.session_id, SessionStatus::Running)
                .await
            {
                yield AgentEvent::error(format!("Session status update failed: {err}"));
                return;
            }

            let mut plan: Plan = session.last_plan().unwrap_or_default();
            let mut last_step: Option<Step> = None;

            tracing::info!(
                session_id = %self.session_id,
                message = %truncate(&message.message, 50),
                "Flow started"
            );

            loop {
                match self.state {
                    FlowState::Idle => {
                        self.state = FlowState::Planning;
                    }
                    FlowState::Planning => {
                        let mut created = false;
                        {
                            let mut events = self.planner.create_plan(&message);
                            while let Some(event) = events.next().await {
                                if let AgentEvent::Plan {
                                    plan: new_plan,
                                    status: PlanEventStatus::Created,
                                    ..
                                } = &event
                                {
                                    plan = new_plan.clone();
                                    created = true;
                                    tracing::info!(
                                        session_id = %self.session_id,
                                        steps = plan.steps.len(),
                                        "Plan created"
                                    );
                                    yield AgentEvent::title(plan.title.clone());
                                    yield AgentEvent::message(plan.message.clone());
                                }
                                yield event;
                            }
                        }
                        if !created {
                            // Planner error was already forwarded; finish the
                            // iteration so the client stream terminates.
                            yield AgentEvent::done();
                            return;
                        }
                        self.state = if plan.steps.is_empty() {
                            FlowState::Completed
                        } else {
                            FlowState::Executing
                        };
                    }
                    FlowState::Executing => {
                        plan.status = ExecutionStatus::Running;
                        let Some(step) = plan.next_step().map(|step| step.clone()) else {
                            self.state = FlowState::Summarizing;
                            continue;
                        };
                        tracing::info!(
                            session_id = %self.session_id,
                            step_id = %step.id,
                            "Executing step"
                        );

                        let mut waited = false;
                        {
                            let mut events =
                                self.executor.execute_step(plan.clone(), step, &message);
                            while let Some(event) = events.next().await {
                                match &event {
                                    AgentEvent::Step { step: updated, .. } => {
                                        if let Some(slot) = plan
                                            .steps
                                            .iter_mut()
                                            .find(|candidate| candidate.id == updated.id)
                                        {
                                            *slot = updated.clone();
                                        }
                                        last_step = Some(updated.clone());
                                    }
                                    AgentEvent::Wait { .. } => {
                                        waited = true;
                                    }
                                    _ => {}
                                }
                                yield event;
                            }
                        }
                        if waited {
                            // The task runner converts the Wait into
                            // status=Waiting and parks the task.
                            return;
                        }

                        if let Err(err) = self.executor.compact_memory().await {
                            tracing::warn!(error = %err, "Memory compaction failed");
                        }
                        self.state = FlowState::Updating;
                    }
                    FlowState::Updating => {
                        let step = last_step.clone().unwrap_or_default();
                        let mut events = self.planner.update_plan(&plan, &step);
                        let mut updated_plan = None;
                        while let Some(event) = events.next().await {
                            if let AgentEvent::Plan {
                                plan: new_plan,
                                status: PlanEventStatus::Updated,
                                ..
                            } = &event
                            {
                                updated_plan = Some(new_plan.clone());
                            }
                            yield event;
                        }
                        drop(events);
                        if let Some(new_plan) = updated_plan {
                            plan = new_plan;
                        }
                        self.state = FlowState::Executing;
                    }
                    FlowState::Summarizing => {
                        let mut events = self.executor.summarize();
                        while let Some(event) = events.next().await {
                            yield event;
                        }
                        self.state = FlowState::Completed;
                    }
                    FlowState::Completed => {
                        plan.status = ExecutionStatus::Completed;
                        yield AgentEvent::plan(plan.clone(), PlanEventStatus::Completed);
                        self.state = FlowState::Idle;
                        break;
                    }
                }
            }

            yield AgentEvent::done();
            tracing::info!(session_id = %self.session_id, "Flow completed");
        })
    }

    pub fn is_done(&self) -> bool {
        self.state == FlowState::Idle
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
