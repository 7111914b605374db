//! Ticket dispatch tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{build_env, ScriptStep, ScriptedLlm};
use opspilot::models::{SessionType, TicketEventType, TicketStatus};
use opspilot::services::{TicketPayload, TicketService};

fn empty_plan() -> String {
    serde_json::json!({
        "message": "Looking into it",
        "language": "en",
        "steps": [],
        "goal": "",
        "title": "Ticket triage",
    })
    .to_string()
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn creating_a_ticket_spawns_a_session_and_dispatches() {
    let llm = ScriptedLlm::new(vec![ScriptStep::Text(empty_plan())]);
    let env = build_env(llm).await;
    let service = Arc::new(TicketService::new(
        env.tickets.clone(),
        env.agent_service.clone(),
    ));

    let ticket = service
        .clone()
        .create_ticket(
            "user-1",
            TicketPayload {
                title: "  Disk almost full  ".into(),
                description: "Root volume at 95% on web-01".into(),
                node_ids: vec!["n1".into()],
                tags: vec!["disk".into(), "  ".into()],
                sla_hours: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(ticket.title, "Disk almost full");
    assert_eq!(ticket.tags, vec!["disk"]);
    assert!(ticket.sla_due_at.is_some());

    // The backing session exists and is typed as a ticket session
    let session = env
        .sessions
        .find_by_id(&ticket.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.session_type, SessionType::Ticket);

    // Async dispatch marks the ticket and runs the agent
    let tickets = env.tickets.clone();
    let ticket_id = ticket.id.clone();
    wait_for(|| {
        let tickets = tickets.clone();
        let ticket_id = ticket_id.clone();
        async move {
            let latest = tickets.find_by_id(&ticket_id).await.unwrap().unwrap();
            latest
                .events
                .iter()
                .any(|event| event.event_type == TicketEventType::AutoDispatched)
        }
    })
    .await;

    let latest = env.tickets.find_by_id(&ticket.id).await.unwrap().unwrap();
    assert_eq!(latest.status, TicketStatus::Processing);
}

#[tokio::test]
async fn dispatch_failure_rolls_the_ticket_to_waiting_user() {
    // No scripted responses: the planner call fails immediately
    let llm = ScriptedLlm::new(vec![]);
    let env = build_env(llm).await;
    let service = Arc::new(TicketService::new(
        env.tickets.clone(),
        env.agent_service.clone(),
    ));

    let ticket = service
        .clone()
        .create_ticket(
            "user-1",
            TicketPayload {
                title: "Broken deploy".into(),
                description: "Pipeline fails at step 3".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tickets = env.tickets.clone();
    let ticket_id = ticket.id.clone();
    wait_for(|| {
        let tickets = tickets.clone();
        let ticket_id = ticket_id.clone();
        async move {
            let latest = tickets.find_by_id(&ticket_id).await.unwrap().unwrap();
            latest.status == TicketStatus::WaitingUser
        }
    })
    .await;

    let latest = env.tickets.find_by_id(&ticket.id).await.unwrap().unwrap();
    assert!(latest
        .comments
        .iter()
        .any(|comment| comment.message.contains("AI dispatch failed")));
}

#[tokio::test]
async fn empty_ticket_fields_are_rejected() {
    let env = build_env(ScriptedLlm::new(vec![])).await;
    let service = Arc::new(TicketService::new(
        env.tickets.clone(),
        env.agent_service.clone(),
    ));

    assert!(service
        .clone()
        .create_ticket(
            "user-1",
            TicketPayload {
                title: "   ".into(),
                description: "something".into(),
                ..Default::default()
            },
        )
        .await
        .is_err());

    assert!(service
        .clone()
        .create_ticket(
            "user-1",
            TicketPayload {
                title: "t".into(),
                description: "".into(),
                ..Default::default()
            },
        )
        .await
        .is_err());
}
