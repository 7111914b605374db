//! Session store contract tests

mod common;

use opspilot::models::{AgentEvent, FileInfo, Session, SessionStatus, SessionType};
use opspilot::store::SessionStore;

async fn store_with_session() -> (SessionStore, Session) {
    let pool = common::memory_pool().await;
    let store = SessionStore::new(pool);
    let session = Session::new("user-1", "agent-1");
    store.save(&session).await.unwrap();
    (store, session)
}

#[tokio::test]
async fn round_trips_a_session_through_the_store() {
    let (store, mut session) = store_with_session().await;
    session.title = Some("Investigate alerts".into());
    session.events.push(AgentEvent::message("hello"));
    session.files.push(FileInfo {
        file_id: "f1".into(),
        filename: "report.md".into(),
        file_path: Some("/home/ubuntu/report.md".into()),
        ..Default::default()
    });
    session.status = SessionStatus::Waiting;
    store.save(&session).await.unwrap();

    let loaded = store.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, session.id);
    assert_eq!(loaded.title.as_deref(), Some("Investigate alerts"));
    assert_eq!(loaded.events.len(), 1);
    assert_eq!(loaded.files.len(), 1);
    assert_eq!(loaded.status, SessionStatus::Waiting);
    assert_eq!(loaded.session_type, SessionType::Chat);
}

#[tokio::test]
async fn ownership_mismatch_reads_as_absent() {
    let (store, session) = store_with_session().await;
    assert!(store
        .find_by_id_and_user_id(&session.id, "user-1")
        .await
        .unwrap()
        .is_some());
    assert!(store
        .find_by_id_and_user_id(&session.id, "someone-else")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn add_event_appends_in_order() {
    let (store, session) = store_with_session().await;
    for index in 0..3 {
        let mut event = AgentEvent::message(format!("m{index}"));
        event.set_id(format!("100-{index}"));
        store.add_event(&session.id, &event).await.unwrap();
    }

    let loaded = store.find_by_id(&session.id).await.unwrap().unwrap();
    let ids: Vec<&str> = loaded
        .events
        .iter()
        .map(|event| event.meta().id.as_str())
        .collect();
    assert_eq!(ids, vec!["100-0", "100-1", "100-2"]);
}

#[tokio::test]
async fn unread_count_survives_concurrent_increments() {
    let (store, session) = store_with_session().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let session_id = session.id.clone();
        handles.push(tokio::spawn(async move {
            store.increment_unread_message_count(&session_id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let loaded = store.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(loaded.unread_message_count, 10);

    store
        .decrement_unread_message_count(&session.id)
        .await
        .unwrap();
    let loaded = store.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(loaded.unread_message_count, 9);

    store
        .update_unread_message_count(&session.id, 0)
        .await
        .unwrap();
    let loaded = store.find_by_id(&session.id).await.unwrap().unwrap();
    assert_eq!(loaded.unread_message_count, 0);
}

#[tokio::test]
async fn share_then_unshare_restores_the_session() {
    let (store, session) = store_with_session().await;

    store.update_shared_status(&session.id, true).await.unwrap();
    assert!(store.find_by_id(&session.id).await.unwrap().unwrap().is_shared);

    store
        .update_shared_status(&session.id, false)
        .await
        .unwrap();
    let restored = store.find_by_id(&session.id).await.unwrap().unwrap();
    assert!(!restored.is_shared);
    assert_eq!(restored.events.len(), session.events.len());
    assert_eq!(restored.status, session.status);
}

#[tokio::test]
async fn file_lookup_by_path_and_removal() {
    let (store, session) = store_with_session().await;
    let file = FileInfo {
        file_id: "f1".into(),
        filename: "out.md".into(),
        file_path: Some("/home/ubuntu/out.md".into()),
        ..Default::default()
    };
    store.add_file(&session.id, &file).await.unwrap();

    let found = store
        .get_file_by_path(&session.id, "/home/ubuntu/out.md")
        .await
        .unwrap();
    assert_eq!(found.unwrap().file_id, "f1");

    assert!(store
        .get_file_by_path(&session.id, "/nope")
        .await
        .unwrap()
        .is_none());

    store.remove_file(&session.id, "f1").await.unwrap();
    assert!(store
        .get_file_by_path(&session.id, "/home/ubuntu/out.md")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn session_type_filter_on_get_all() {
    let pool = common::memory_pool().await;
    let store = SessionStore::new(pool);

    let chat = Session::new("u1", "a1");
    let mut ticket = Session::new("u1", "a2");
    ticket.session_type = SessionType::Ticket;
    store.save(&chat).await.unwrap();
    store.save(&ticket).await.unwrap();

    let all = store.get_all(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let tickets = store.get_all(Some(SessionType::Ticket)).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id, ticket.id);
}
