//! End-to-end flow tests over the chat generator with a scripted model

mod common;

use std::time::Duration;

use futures::StreamExt;

use common::{build_env, tool_call, ScriptStep, ScriptedLlm};
use opspilot::models::{
    AgentEvent, MessageRole, PlanEventStatus, SessionStatus, SessionType, StepEventStatus,
    ToolStatus,
};

fn plan_json(message: &str, steps: &[(&str, &str)]) -> String {
    let steps: Vec<serde_json::Value> = steps
        .iter()
        .map(|(id, description)| serde_json::json!({"id": id, "description": description}))
        .collect();
    serde_json::json!({
        "message": message,
        "language": "en",
        "steps": steps,
        "goal": "finish the task",
        "title": "Test task",
    })
    .to_string()
}

fn step_json(success: bool, result: &str) -> String {
    serde_json::json!({
        "success": success,
        "result": result,
        "attachments": [],
    })
    .to_string()
}

fn summary_json(message: &str) -> String {
    serde_json::json!({"message": message, "attachments": []}).to_string()
}

async fn collect_chat(
    env: &common::TestEnv,
    session_id: &str,
    message: Option<&str>,
) -> Vec<AgentEvent> {
    let stream = env.agent_service.clone().chat(
        session_id.to_string(),
        "user-1".to_string(),
        message.map(str::to_string),
        None,
        None,
        Vec::new(),
    );
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("chat stream should terminate")
}

fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|event| match event {
            AgentEvent::Message { .. } => "message",
            AgentEvent::Plan {
                status: PlanEventStatus::Created,
                ..
            } => "plan_created",
            AgentEvent::Plan {
                status: PlanEventStatus::Updated,
                ..
            } => "plan_updated",
            AgentEvent::Plan {
                status: PlanEventStatus::Completed,
                ..
            } => "plan_completed",
            AgentEvent::Step {
                status: StepEventStatus::Started,
                ..
            } => "step_started",
            AgentEvent::Step {
                status: StepEventStatus::Completed,
                ..
            } => "step_completed",
            AgentEvent::Step {
                status: StepEventStatus::Failed,
                ..
            } => "step_failed",
            AgentEvent::Tool {
                status: ToolStatus::Calling,
                ..
            } => "tool_calling",
            AgentEvent::Tool {
                status: ToolStatus::Called,
                ..
            } => "tool_called",
            AgentEvent::Title { .. } => "title",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Wait { .. } => "wait",
        })
        .collect()
}

#[tokio::test]
async fn empty_plan_completes_without_execution() {
    let llm = ScriptedLlm::new(vec![ScriptStep::Text(plan_json("Nothing to do", &[]))]);
    let env = build_env(llm).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();

    let events = collect_chat(&env, &session.id, Some("hello")).await;
    assert_eq!(
        kinds(&events),
        vec!["title", "message", "plan_created", "plan_completed", "done"],
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let session = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.title.as_deref(), Some("Test task"));
}

#[tokio::test]
async fn single_step_plan_runs_tools_and_summarizes() {
    let llm = ScriptedLlm::new(vec![
        ScriptStep::Text(plan_json("On it", &[("1", "check uptime")])),
        ScriptStep::Tools(vec![tool_call(
            "call_1",
            "shell_exec",
            serde_json::json!({"id": "main", "command": "uptime"}),
        )]),
        ScriptStep::Text(step_json(true, "load is fine")),
        ScriptStep::Text(serde_json::json!({"steps": []}).to_string()),
        ScriptStep::Text(summary_json("Everything checks out")),
    ]);
    let env = build_env(llm).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();

    let events = collect_chat(&env, &session.id, Some("is the box healthy?")).await;
    assert_eq!(
        kinds(&events),
        vec![
            "title",
            "message",
            "plan_created",
            "step_started",
            "tool_calling",
            "tool_called",
            "step_completed",
            "message",
            "plan_updated",
            "message",
            "plan_completed",
            "done",
        ],
    );

    // The completed tool event was enriched with the shell console
    let enriched = events.iter().find_map(|event| match event {
        AgentEvent::Tool {
            status: ToolStatus::Called,
            tool_content,
            function_result,
            ..
        } => Some((tool_content.clone(), function_result.clone())),
        _ => None,
    });
    let (content, result) = enriched.expect("called tool event present");
    assert!(content.is_some(), "shell tool content attached");
    assert!(result.unwrap().success);

    // Events are durable in the session store with stream-assigned ids
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    // user message + all streamed events
    assert_eq!(stored.events.len(), events.len() + 1);
    assert!(stored
        .events
        .iter()
        .skip(1)
        .all(|event| event.meta().id.contains('-')));
}

#[tokio::test]
async fn ask_user_parks_the_session_and_resume_continues() {
    let llm = ScriptedLlm::new(vec![
        // first message
        ScriptStep::Text(plan_json("Need input", &[("1", "confirm target host")])),
        ScriptStep::Tools(vec![tool_call(
            "call_1",
            "message_ask_user",
            serde_json::json!({"text": "Which host should I check?"}),
        )]),
        // resume
        ScriptStep::Text(step_json(true, "checked web-01")),
        ScriptStep::Text(serde_json::json!({"steps": []}).to_string()),
        ScriptStep::Text(summary_json("web-01 is healthy")),
    ]);
    let env = build_env(llm).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();

    let events = collect_chat(&env, &session.id, Some("check the host")).await;
    assert_eq!(
        kinds(&events),
        vec![
            "title",
            "message",
            "plan_created",
            "step_started",
            "message",
            "wait",
        ],
    );
    let question = events.iter().rev().find_map(|event| match event {
        AgentEvent::Message { message, role, .. } if *role == MessageRole::Assistant => {
            Some(message.clone())
        }
        _ => None,
    });
    assert_eq!(question.unwrap(), "Which host should I check?");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let parked = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(parked.status, SessionStatus::Waiting);

    // Resume: entry rolls the agents back and re-enters in Executing
    let events = collect_chat(&env, &session.id, Some("web-01 please")).await;
    assert_eq!(
        kinds(&events),
        vec![
            "step_started",
            "step_completed",
            "message",
            "plan_updated",
            "message",
            "plan_completed",
            "done",
        ],
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let finished = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
}

#[tokio::test]
async fn stop_mid_flow_emits_done_and_releases_resources() {
    let llm = ScriptedLlm::new(vec![
        ScriptStep::Text(plan_json("Working", &[("1", "long running step")])),
        ScriptStep::Hang,
    ]);
    let env = build_env(llm).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();

    let service = env.agent_service.clone();
    let mut stream = service.clone().chat(
        session.id.clone(),
        "user-1".to_string(),
        Some("start something slow".to_string()),
        None,
        None,
        Vec::new(),
    );

    // Drain until the step starts, then stop the session
    let mut seen = Vec::new();
    while let Some(event) = stream.next().await {
        let is_step_start = matches!(
            event,
            AgentEvent::Step {
                status: StepEventStatus::Started,
                ..
            }
        );
        seen.push(event);
        if is_step_start {
            break;
        }
    }
    service.stop_session(&session.id, "user-1").await.unwrap();

    // The stream ends with exactly one Done from the cancelled worker
    let rest = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("stream terminates after stop");
    assert!(matches!(rest.last(), Some(AgentEvent::Done { .. })));
    assert_eq!(
        rest.iter()
            .filter(|event| matches!(event, AgentEvent::Done { .. }))
            .count(),
        1
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stopped = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(stopped.status, SessionStatus::Completed);
    assert!(env
        .sandbox
        .destroyed
        .load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn chat_with_unknown_session_yields_error_event() {
    let llm = ScriptedLlm::new(vec![]);
    let env = build_env(llm).await;

    let events = collect_chat(&env, "no-such-session", Some("hi")).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], AgentEvent::Error { .. }));
}
