//! Target resolution and history loading, end to end through `ChatSession`.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use threadline_core::api::RawMessage;
use threadline_core::{
    Address, ChatId, ChatSession, ContactId, DisplayMeta, Identity, LoadOutcome, MessageId,
    SessionEvent, Target, TargetIntent,
};
use threadline_test_utils::tracing_setup::init_test_tracing;
use threadline_test_utils::{Op, Request, ScriptedBackend};

fn chat(id: &str, name: &str) -> TargetIntent {
    TargetIntent::Chat {
        chat_id: ChatId::from(id),
        meta: DisplayMeta::new(name),
    }
}

fn new_contact(id: &str, name: &str) -> TargetIntent {
    TargetIntent::NewContact {
        contact_id: ContactId::from(id),
        name: name.to_string(),
        phone: "+15550100".to_string(),
    }
}

fn signed_in(backend: ScriptedBackend) -> (ChatSession, Arc<ScriptedBackend>) {
    let backend = Arc::new(backend);
    let session = ChatSession::with_backend(backend.clone()).with_identity(Identity::new("1"));
    (session, backend)
}

fn anna_history() -> Vec<RawMessage> {
    vec![
        RawMessage::text(1, "Hi!")
            .from_sender("Anna")
            .at("2024-03-01T14:20:00"),
        RawMessage::text(2, "Hello")
            .own()
            .at("2024-03-01T14:21:00")
            .replying_to(1),
        RawMessage::text(3, "How are you?").at("2024-03-01T14:22:00"),
    ]
}

#[tokio::test]
async fn test_load_without_identity_makes_no_call() {
    let backend = Arc::new(ScriptedBackend::new().with_chat("10", None, anna_history()));
    let session = ChatSession::with_backend(backend.clone());
    session.select(chat("10", "Anna"));

    let outcome = session.load_messages().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Skipped);
    assert!(session.messages().is_empty());
    assert_eq!(backend.request_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_load_replaces_list_in_server_order() {
    let (session, backend) = signed_in(ScriptedBackend::new().with_chat("10", None, anna_history()));
    session.select(chat("10", "Anna"));

    let outcome = session.load_messages().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Applied { count: 3 });
    let messages = session.messages();
    let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert!(messages[1].is_own);
    assert!(!messages[0].is_own);

    let reply = messages[1].reply_to.as_ref().unwrap();
    assert_eq!(reply.text.as_deref(), Some("Hi!"));
    assert_eq!(reply.sender.as_deref(), Some("Anna"));

    assert_eq!(
        backend.requests(),
        vec![Request::Fetch {
            user_id: "1".to_string(),
            address: Address::Chat(ChatId::from("10")),
        }]
    );
}

#[tokio::test]
async fn test_load_by_contact_adopts_chat_id() {
    let backend = ScriptedBackend::new().with_chat(
        "55",
        Some(ContactId::from("7")),
        vec![RawMessage::text(9, "earlier")],
    );
    let (session, backend) = signed_in(backend);
    let mut events = session.subscribe();
    session.select(new_contact("7", "Boris"));

    session.load_messages().await.unwrap();

    let target = session.target().unwrap();
    assert_eq!(target.chat_id(), Some(&ChatId::from("55")));
    assert_eq!(target.contact_id(), Some(&ContactId::from("7")));
    assert_eq!(session.messages().len(), 1);

    // A second load goes by chat id.
    session.load_messages().await.unwrap();
    let requests = backend.requests();
    assert_eq!(
        requests[0],
        Request::Fetch {
            user_id: "1".to_string(),
            address: Address::Contact(ContactId::from("7")),
        }
    );
    assert_eq!(
        requests[1],
        Request::Fetch {
            user_id: "1".to_string(),
            address: Address::Chat(ChatId::from("55")),
        }
    );

    let mut adopted = false;
    while let Ok(event) = events.try_recv() {
        if event
            == (SessionEvent::ChatAdopted {
                chat_id: ChatId::from("55"),
            })
        {
            adopted = true;
        }
    }
    assert!(adopted);
}

#[tokio::test]
async fn test_load_failure_yields_empty_list() {
    let (session, backend) = signed_in(ScriptedBackend::new().with_chat("10", None, anna_history()));
    session.select(chat("10", "Anna"));
    session.load_messages().await.unwrap();
    assert_eq!(session.messages().len(), 3);

    backend.fail(Op::Fetch);
    let outcome = session.load_messages().await.unwrap();

    assert_eq!(outcome, LoadOutcome::Failed);
    assert!(session.messages().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_switching_target_discards_stale_load() {
    let backend = ScriptedBackend::new()
        .with_chat("10", None, anna_history())
        .with_chat("20", None, vec![RawMessage::text(40, "from B")]);
    let (session, backend) = signed_in(backend);
    backend.gate(Op::Fetch);

    session.select(chat("10", "Anna"));
    let load_a = tokio::spawn({
        let session = session.clone();
        async move { session.load_messages().await }
    });
    backend.wait_for_requests(1).await;

    session.select(chat("20", "Boris"));
    backend.ungate(Op::Fetch);
    backend.release_all();

    assert_eq!(load_a.await.unwrap().unwrap(), LoadOutcome::Discarded);
    assert!(session.messages().is_empty());

    let outcome = session.load_messages().await.unwrap();
    assert_eq!(outcome, LoadOutcome::Applied { count: 1 });
    assert_eq!(session.messages()[0].id, MessageId::from("40"));
}

#[tokio::test]
async fn test_stale_load_does_not_adopt_chat_id() {
    let backend = ScriptedBackend::new().with_chat("55", Some(ContactId::from("7")), vec![]);
    let (session, backend) = signed_in(backend);
    backend.gate(Op::Fetch);

    session.select(new_contact("7", "Boris"));
    let load = tokio::spawn({
        let session = session.clone();
        async move { session.load_messages().await }
    });
    backend.wait_for_requests(1).await;

    session.select(new_contact("8", "Vera"));
    backend.release_all();

    assert_eq!(load.await.unwrap().unwrap(), LoadOutcome::Discarded);
    let target = session.target().unwrap();
    assert!(target.is_pending());
    assert_eq!(target.contact_id(), Some(&ContactId::from("8")));
}

#[tokio::test]
async fn test_select_clears_list_and_compose() {
    init_test_tracing();
    let (session, _backend) = signed_in(ScriptedBackend::new().with_chat("10", None, anna_history()));
    session.select(chat("10", "Anna"));
    session.load_messages().await.unwrap();
    session.reply_to(&MessageId::from("3")).unwrap();
    session.set_draft("typing");

    let generation = session.select(chat("20", "Boris"));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.generation, generation);
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.compose.reply_to.is_none());
    assert_eq!(snapshot.compose.draft, "");
    assert!(matches!(snapshot.target, Some(Target::SelectedChat { .. })));
}

#[tokio::test]
async fn test_close_drops_target() {
    let (session, _backend) = signed_in(ScriptedBackend::new());
    session.select(chat("10", "Anna"));
    session.close();
    assert!(session.target().is_none());
    assert!(session.load_messages().await.is_err());
}
