//! SSH approval workflow and node quota tests

mod common;

use common::{build_env, ScriptedLlm};
use opspilot::error::Error;
use opspilot::models::{AgentEvent, MessageRole, SessionType};
use opspilot::services::NodePayload;

fn approval_node_payload(name: &str) -> NodePayload {
    NodePayload {
        name: Some(name.to_string()),
        ssh_enabled: Some(true),
        ssh_host: Some("127.0.0.1".to_string()),
        ssh_port: Some(1),
        ssh_username: Some("ops".to_string()),
        ssh_password: Some("password".to_string()),
        ssh_require_approval: Some(true),
        ..Default::default()
    }
}

#[tokio::test]
async fn ai_command_on_guarded_node_requires_approval() {
    let env = build_env(ScriptedLlm::new(vec![])).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();
    let node = env
        .node_service
        .create_node("user-1", approval_node_payload("web-01"))
        .await
        .unwrap();

    let result = env
        .node_service
        .execute_ai_command("user-1", &session.id, &node.id, "rm -rf /tmp/x", Some("call_9".into()))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.message, "approval_required");
    let data = result.data.unwrap();
    assert_eq!(data["approval_required"], true);
    let approval_id = data["approval_id"].as_str().unwrap().to_string();

    let pending = env
        .node_service
        .list_pending_approvals(&session.id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, approval_id);
    assert_eq!(
        pending[0].requested_by_tool_call_id.as_deref(),
        Some("call_9")
    );
}

#[tokio::test]
async fn rejection_writes_a_user_message_and_is_idempotent() {
    let env = build_env(ScriptedLlm::new(vec![])).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();
    let node = env
        .node_service
        .create_node("user-1", approval_node_payload("web-01"))
        .await
        .unwrap();

    let result = env
        .node_service
        .execute_ai_command("user-1", &session.id, &node.id, "reboot", None)
        .await
        .unwrap();
    let approval_id = result.data.unwrap()["approval_id"]
        .as_str()
        .unwrap()
        .to_string();

    let decision = env
        .node_service
        .decide_approval("user-1", &approval_id, false, Some("too risky"))
        .await
        .unwrap();
    assert!(decision.success);
    assert_eq!(decision.message, "rejected");

    // The session history carries a user-role message about the rejection
    let stored = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    let rejection = stored.events.iter().find_map(|event| match event {
        AgentEvent::Message { role, message, .. } if *role == MessageRole::User => {
            Some(message.clone())
        }
        _ => None,
    });
    let rejection = rejection.expect("rejection message recorded");
    assert!(rejection.contains("rejected"));
    assert!(rejection.contains("too risky"));
    assert!(rejection.contains("web-01"));

    // A second decision answers idempotently
    let repeat = env
        .node_service
        .decide_approval("user-1", &approval_id, true, None)
        .await
        .unwrap();
    assert!(!repeat.success);
    assert_eq!(repeat.message, "already_rejected");

    assert!(env
        .node_service
        .list_pending_approvals(&session.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn approval_executes_and_records_the_outcome() {
    let env = build_env(ScriptedLlm::new(vec![])).await;
    let session = env
        .agent_service
        .create_session("user-1", SessionType::Chat)
        .await
        .unwrap();
    let node = env
        .node_service
        .create_node("user-1", approval_node_payload("web-01"))
        .await
        .unwrap();

    let result = env
        .node_service
        .execute_ai_command("user-1", &session.id, &node.id, "uptime", None)
        .await
        .unwrap();
    let approval_id = result.data.unwrap()["approval_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Nothing listens on port 1, so the run itself fails; the approval is
    // still consumed and the outcome recorded.
    let decision = env
        .node_service
        .decide_approval("user-1", &approval_id, true, None)
        .await
        .unwrap();
    assert_eq!(decision.message, "approved");
    assert!(!decision.success);

    let stored = env.sessions.find_by_id(&session.id).await.unwrap().unwrap();
    let outcome = stored.events.iter().find_map(|event| match event {
        AgentEvent::Message { role, message, .. } if *role == MessageRole::User => {
            Some(message.clone())
        }
        _ => None,
    });
    let outcome = outcome.expect("outcome message recorded");
    assert!(outcome.contains("approved and executed"));
    assert!(outcome.contains("uptime"));

    // Execution left an operation log behind
    let logs = env
        .node_service
        .list_logs("user-1", &node.id, 10)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].source, "approval");
    assert_eq!(logs[0].actor_type, "assistant");
    assert!(!logs[0].success);
}

#[tokio::test]
async fn node_quota_is_eight_per_user() {
    let env = build_env(ScriptedLlm::new(vec![])).await;

    for index in 0..8 {
        env.node_service
            .create_node(
                "user-1",
                NodePayload {
                    name: Some(format!("node-{index}")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let overflow = env
        .node_service
        .create_node(
            "user-1",
            NodePayload {
                name: Some("node-8".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(overflow, Err(Error::BadRequest(_))));

    // Other users are unaffected
    env.node_service
        .create_node(
            "user-2",
            NodePayload {
                name: Some("their-node".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}
