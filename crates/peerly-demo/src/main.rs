//! Scripted walkthrough of the messaging core: wires the in-memory store,
//! the bus, and the service together the way a UI shell would, then runs
//! a short tutoring chat and prints every event a subscriber sees.

use std::sync::Arc;

use tracing::info;

use peerly_bus::{EventBus, topics};
use peerly_chat::{ChatService, ListOptions, MarkRead, MessageQuery, ReactionInput, SendMessage};
use peerly_store::{MemoryStore, Store};
use peerly_types::models::{MessageKind, User};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peerly=debug".into()),
        )
        .init();

    // Config
    let student = std::env::var("PEERLY_DEMO_STUDENT").unwrap_or_else(|_| "maya".into());
    let tutor = std::env::var("PEERLY_DEMO_TUTOR").unwrap_or_else(|_| "jordan".into());

    let store = Arc::new(MemoryStore::new());
    for (id, name) in [(&student, "Maya"), (&tutor, "Jordan")] {
        store.upsert_user(User {
            id: id.clone(),
            username: id.clone(),
            display_name: name.to_string(),
            avatar_url: None,
        })?;
    }

    let service = ChatService::new(store, EventBus::new());

    let conversation = service.find_or_create_direct(&student, &tutor).await?;
    info!(conversation_id = %conversation.id, "direct conversation ready");

    // A UI for this room would hold exactly this subscription.
    let mut room = service.bus().subscribe(&topics::messages(conversation.id));

    service.set_typing(conversation.id, &student, true).await?;
    let question = service
        .send_message(SendMessage {
            conversation_id: conversation.id,
            sender_id: student.clone(),
            kind: MessageKind::Text,
            text: Some("Hey! Do you have time to help me with calculus today?".into()),
            attachment: None,
        })
        .await?;
    service.set_typing(conversation.id, &student, false).await?;

    let reply = service
        .send_message(SendMessage {
            conversation_id: conversation.id,
            sender_id: tutor.clone(),
            kind: MessageKind::Text,
            text: Some("Sure - library at 3pm?".into()),
            attachment: None,
        })
        .await?;

    service
        .add_reaction(ReactionInput {
            message_id: reply.id,
            user_id: student.clone(),
            emoji: "👍".into(),
        })
        .await?;

    service
        .mark_read(MarkRead {
            conversation_id: conversation.id,
            user_id: tutor.clone(),
            message_id: question.id,
        })
        .await?;

    while let Some(event) = room.try_recv() {
        println!("event: {}", serde_json::to_string(&event)?);
    }

    let history = service
        .list_messages(conversation.id, MessageQuery::default())
        .await?;
    println!("history: {}", serde_json::to_string_pretty(&history)?);

    let inbox = service
        .list_conversations(&tutor, ListOptions::default())
        .await?;
    for convo in inbox {
        println!(
            "inbox: {} - {}",
            convo.id,
            convo.last_message_preview.as_deref().unwrap_or("(empty)")
        );
    }

    Ok(())
}
