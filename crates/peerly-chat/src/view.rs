//! Derived read models: reaction grouping, conversation previews, and the
//! tombstone treatment for soft-deleted messages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use peerly_types::models::{
    Attachment, Delivery, Message, MessageKind, Reaction, ReactionGroup, UserId,
};

/// The fixed set of emoji a reaction may use.
pub const ALLOWED_EMOJI: &[&str] = &["👍", "❤️", "😂", "😮", "😢", "🔥"];

/// Preview shown when the newest message has been deleted.
pub const TOMBSTONE_PREVIEW: &str = "Message deleted";

/// Denormalized conversation-list preview for a message.
pub fn preview_for(kind: MessageKind, text: Option<&str>) -> String {
    match kind {
        MessageKind::Text | MessageKind::System => text.unwrap_or_default().to_string(),
        MessageKind::Image => "[photo]".to_string(),
        MessageKind::File => "[file]".to_string(),
    }
}

/// A message as the UI renders it: reactions attached, deleted content
/// replaced by a tombstone.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub delivery: Delivery,
    pub reactions: Vec<ReactionGroup>,
}

/// Collapse raw reaction rows into per-message, per-emoji groups.
pub fn group_reactions(rows: Vec<Reaction>) -> HashMap<Uuid, Vec<ReactionGroup>> {
    let mut by_message: HashMap<Uuid, HashMap<String, Vec<UserId>>> = HashMap::new();
    for row in rows {
        by_message
            .entry(row.message_id)
            .or_default()
            .entry(row.emoji)
            .or_default()
            .push(row.user_id);
    }

    by_message
        .into_iter()
        .map(|(message_id, emoji_map)| {
            let mut groups: Vec<ReactionGroup> = emoji_map
                .into_iter()
                .map(|(emoji, user_ids)| ReactionGroup {
                    emoji,
                    count: user_ids.len(),
                    user_ids,
                })
                .collect();
            // Stable output regardless of hash order.
            groups.sort_by(|a, b| a.emoji.cmp(&b.emoji));
            (message_id, groups)
        })
        .collect()
}

/// Project a stored message into its rendered form. Deleted messages keep
/// their id, sender, and timestamps but lose text and attachment.
pub fn render_message(message: Message, reactions: Vec<ReactionGroup>) -> MessageView {
    let deleted = message.is_deleted();
    MessageView {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        kind: message.kind,
        text: if deleted { None } else { message.text },
        attachment: if deleted { None } else { message.attachment },
        created_at: message.created_at,
        edited_at: message.edited_at,
        deleted,
        delivery: message.delivery,
        reactions,
    }
}
