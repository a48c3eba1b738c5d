//! Cross-crate scenarios exercising the service, store, and bus together.

use std::sync::Arc;

use uuid::Uuid;

use peerly_bus::{EventBus, topics};
use peerly_chat::{ChatService, ListOptions, MarkRead, MessageQuery, ReactionInput, SendMessage};
use peerly_chat::error::ChatError;
use peerly_store::{MemoryStore, Store};
use peerly_types::events::ChatEvent;
use peerly_types::models::{MessageKind, User};

fn service_with_users(ids: &[&str]) -> ChatService {
    let store = Arc::new(MemoryStore::new());
    for id in ids {
        store
            .upsert_user(User {
                id: id.to_string(),
                username: id.to_string(),
                display_name: id.to_string(),
                avatar_url: None,
            })
            .unwrap();
    }
    ChatService::new(store, EventBus::new())
}

fn text(conversation_id: Uuid, sender: &str, body: &str) -> SendMessage {
    SendMessage {
        conversation_id,
        sender_id: sender.to_string(),
        kind: MessageKind::Text,
        text: Some(body.to_string()),
        attachment: None,
    }
}

#[tokio::test]
async fn messages_list_in_exact_send_order() {
    let svc = service_with_users(&["a", "b"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();

    let mut sent = Vec::new();
    for i in 0..20 {
        let sender = if i % 2 == 0 { "a" } else { "b" };
        let msg = svc
            .send_message(text(convo.id, sender, &format!("message {i}")))
            .await
            .unwrap();
        sent.push(msg.id);
    }

    let listed: Vec<Uuid> = svc
        .list_messages(convo.id, MessageQuery { limit: 20, before: None })
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(listed, sent);
}

#[tokio::test]
async fn cursor_pagination_has_no_gaps_or_duplicates() {
    let svc = service_with_users(&["a", "b"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();

    let mut sent = Vec::new();
    for i in 0..17 {
        let msg = svc
            .send_message(text(convo.id, "a", &format!("m{i}")))
            .await
            .unwrap();
        sent.push(msg.id);
    }

    // Page sizes that don't divide the history evenly still cover it.
    for page_size in [1u32, 3, 5, 17, 40] {
        let mut walked = Vec::new();
        let mut before = None;
        loop {
            let page = svc
                .list_messages(
                    convo.id,
                    MessageQuery {
                        limit: page_size,
                        before,
                    },
                )
                .await
                .unwrap();
            if page.is_empty() {
                break;
            }
            before = Some(page[0].id);
            let mut ids: Vec<Uuid> = page.into_iter().map(|m| m.id).collect();
            ids.extend(walked);
            walked = ids;
        }
        assert_eq!(walked, sent, "page size {page_size}");
    }
}

#[tokio::test]
async fn reactions_are_idempotent_both_ways() {
    let svc = service_with_users(&["a", "b"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();
    let msg = svc.send_message(text(convo.id, "a", "hi")).await.unwrap();

    let input = ReactionInput {
        message_id: msg.id,
        user_id: "b".into(),
        emoji: "👍".into(),
    };
    svc.add_reaction(input.clone()).await.unwrap();
    svc.add_reaction(input.clone()).await.unwrap();

    let page = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap();
    assert_eq!(page[0].reactions.len(), 1);
    assert_eq!(page[0].reactions[0].count, 1);

    svc.remove_reaction(input.clone()).await.unwrap();
    // Removing what is already gone is a no-op.
    svc.remove_reaction(input).await.unwrap();

    let page = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap();
    assert!(page[0].reactions.is_empty());
}

#[tokio::test]
async fn read_state_never_regresses() {
    let svc = service_with_users(&["a", "b"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();

    let older = svc.send_message(text(convo.id, "a", "first")).await.unwrap();
    let newer = svc.send_message(text(convo.id, "a", "second")).await.unwrap();

    svc.mark_read(MarkRead {
        conversation_id: convo.id,
        user_id: "b".into(),
        message_id: newer.id,
    })
    .await
    .unwrap();

    let marked = svc
        .mark_read(MarkRead {
            conversation_id: convo.id,
            user_id: "b".into(),
            message_id: older.id,
        })
        .await
        .unwrap();

    // The older message still picks up the receipt, and the newer one
    // keeps the receipt it already had.
    assert!(marked.delivery.read_by.contains("b"));
    let page = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap();
    assert!(page[0].delivery.read_by.contains("b"));
    assert!(page[1].delivery.read_by.contains("b"));
}

#[tokio::test]
async fn delete_conversation_cascades_and_notifies() {
    let svc = service_with_users(&["a", "b"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();
    let msg = svc.send_message(text(convo.id, "a", "bye")).await.unwrap();
    svc.add_reaction(ReactionInput {
        message_id: msg.id,
        user_id: "b".into(),
        emoji: "😢".into(),
    })
    .await
    .unwrap();

    let mut a_list = svc.bus().subscribe(&topics::conversations("a"));
    let mut b_list = svc.bus().subscribe(&topics::conversations("b"));

    svc.delete_conversation(convo.id, "a").await.unwrap();

    for sub in [&mut a_list, &mut b_list] {
        match sub.try_recv() {
            Some(ChatEvent::ConversationDeleted { conversation_id }) => {
                assert_eq!(conversation_id, convo.id);
            }
            other => panic!("expected ConversationDeleted, got {other:?}"),
        }
    }

    let err = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound("conversation")));
    assert!(
        svc.list_conversations("a", ListOptions::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn mark_read_by_non_member_leaves_no_receipt() {
    let svc = service_with_users(&["a", "b", "stranger"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();
    let msg = svc.send_message(text(convo.id, "a", "hi")).await.unwrap();

    let err = svc
        .mark_read(MarkRead {
            conversation_id: convo.id,
            user_id: "stranger".into(),
            message_id: msg.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound("membership")));

    let page = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap();
    assert!(page[0].delivery.read_by.is_empty());
    assert!(page[0].delivery.delivered_to.is_empty());
}

#[tokio::test]
async fn non_members_cannot_delete() {
    let svc = service_with_users(&["a", "b", "stranger"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();

    let err = svc
        .delete_conversation(convo.id, "stranger")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound("membership")));
}

#[tokio::test]
async fn message_events_reach_room_subscribers() {
    let svc = service_with_users(&["a", "b"]);
    let convo = svc.find_or_create_direct("a", "b").await.unwrap();

    let mut room = svc.bus().subscribe(&topics::messages(convo.id));

    let msg = svc.send_message(text(convo.id, "a", "ping")).await.unwrap();
    svc.add_reaction(ReactionInput {
        message_id: msg.id,
        user_id: "b".into(),
        emoji: "👍".into(),
    })
    .await
    .unwrap();

    match room.try_recv() {
        Some(ChatEvent::MessageCreated { message }) => assert_eq!(message.id, msg.id),
        other => panic!("expected MessageCreated, got {other:?}"),
    }
    match room.try_recv() {
        Some(ChatEvent::ReactionAdded {
            conversation_id,
            message_id,
            ..
        }) => {
            // Reaction events are scoped to the owning conversation.
            assert_eq!(conversation_id, convo.id);
            assert_eq!(message_id, msg.id);
        }
        other => panic!("expected ReactionAdded, got {other:?}"),
    }
}

/// The full tutoring flow: a student opens a direct conversation, the
/// tutor replies, the student reacts, the tutor reads.
#[tokio::test]
async fn tutoring_session_end_to_end() {
    let svc = service_with_users(&["1", "current-user"]);
    let convo = svc.find_or_create_direct("1", "current-user").await.unwrap();

    svc.send_message(text(
        convo.id,
        "1",
        "Hey! Do you have time to help me with calculus today?",
    ))
    .await
    .unwrap();

    let reply = svc
        .send_message(text(convo.id, "current-user", "Sure, free after 3pm!"))
        .await
        .unwrap();

    svc.add_reaction(ReactionInput {
        message_id: reply.id,
        user_id: "1".into(),
        emoji: "👍".into(),
    })
    .await
    .unwrap();

    svc.mark_read(MarkRead {
        conversation_id: convo.id,
        user_id: "current-user".into(),
        message_id: reply.id,
    })
    .await
    .unwrap();

    let page = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(
        page[0].text.as_deref(),
        Some("Hey! Do you have time to help me with calculus today?")
    );

    let last = &page[1];
    assert_eq!(last.reactions.len(), 1);
    assert_eq!(last.reactions[0].emoji, "👍");
    assert_eq!(last.reactions[0].user_ids, vec!["1".to_string()]);
    // The sender read their own message: receipt semantics exclude them,
    // so check the student's read instead after they mark it too.
    svc.mark_read(MarkRead {
        conversation_id: convo.id,
        user_id: "1".into(),
        message_id: reply.id,
    })
    .await
    .unwrap();
    let page = svc
        .list_messages(convo.id, MessageQuery::default())
        .await
        .unwrap();
    assert!(page[1].delivery.read_by.contains("1"));

    let list = svc
        .list_conversations("current-user", ListOptions::default())
        .await
        .unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(
        list[0].last_message_preview.as_deref(),
        Some("Sure, free after 3pm!")
    );
}
