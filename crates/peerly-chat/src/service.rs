//! The messaging service: the one contract UI adapters program against.
//!
//! Every operation validates its input, applies the whole mutation through
//! the store (each store call is atomic), and only then emits change
//! notifications. There is no await between a mutation and its emission,
//! so a concurrent caller never observes state the bus has not been told
//! about in the same operation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use peerly_bus::{EventBus, topics};
use peerly_store::Store;
use peerly_types::events::ChatEvent;
use peerly_types::models::{
    Attachment, Conversation, ConversationKind, ConversationMember, Delivery, MemberRole,
    Message, MessageKind, Reaction, User, UserId,
};

use crate::error::{ChatError, Result};
use crate::view::{self, MessageView};

// -- Operation inputs --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessage {
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub kind: MessageKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroup {
    pub title: String,
    /// The first id becomes the group owner.
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionInput {
    pub message_id: Uuid,
    pub user_id: UserId,
    pub emoji: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkRead {
    pub conversation_id: Uuid,
    pub user_id: UserId,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOptions {
    /// Cap on the number of conversations returned; unbounded when absent.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Keyset cursor: return messages strictly before this message id.
    pub before: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            before: None,
        }
    }
}

/// Orchestrates store mutations and bus emissions.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn Store>,
    bus: EventBus<ChatEvent>,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, bus: EventBus<ChatEvent>) -> Self {
        Self { store, bus }
    }

    /// The bus consumers subscribe on for live updates.
    pub fn bus(&self) -> &EventBus<ChatEvent> {
        &self.bus
    }

    // -- Reads --

    /// Conversations the user belongs to, newest activity first.
    pub async fn list_conversations(
        &self,
        user_id: &str,
        options: ListOptions,
    ) -> Result<Vec<Conversation>> {
        let mut conversations = self.store.list_conversations_for_user(user_id)?;
        if let Some(limit) = options.limit {
            conversations.truncate(limit);
        }
        Ok(conversations)
    }

    /// An ascending page of messages with reactions attached. Walking the
    /// `before` cursor from the newest page covers the whole history with
    /// no gaps and no duplicates.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: MessageQuery,
    ) -> Result<Vec<MessageView>> {
        let limit = query.limit.clamp(1, 200) as usize;
        let messages = self
            .store
            .list_messages(conversation_id, limit, query.before)?;

        let message_ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let rows = self.store.reactions_for_messages(&message_ids)?;
        let mut grouped = view::group_reactions(rows);

        Ok(messages
            .into_iter()
            .map(|message| {
                let reactions = grouped.remove(&message.id).unwrap_or_default();
                view::render_message(message, reactions)
            })
            .collect())
    }

    // -- Direct conversations --

    /// The unique direct conversation between two users, created on first
    /// use. Repeated calls always resolve to the same conversation.
    pub async fn find_or_create_direct(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation> {
        if user_a == user_b {
            return Err(ChatError::Validation(
                "a direct conversation needs two distinct users".into(),
            ));
        }
        self.require_user(user_a)?;
        self.require_user(user_b)?;

        if let Some(existing) = self.store.find_direct(user_a, user_b)? {
            return Ok(existing);
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            title: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
            last_message_preview: None,
        };
        let members = vec![
            member_record(conversation.id, user_a, MemberRole::Member, now),
            member_record(conversation.id, user_b, MemberRole::Member, now),
        ];

        // The store's pair index is the uniqueness guard; a concurrent
        // creation surfaces as a Conflict rather than a duplicate.
        self.store
            .insert_conversation(conversation.clone(), members.clone())?;
        info!(conversation_id = %conversation.id, "direct conversation created");

        self.emit_to_members(
            &members,
            ChatEvent::ConversationCreated {
                conversation: conversation.clone(),
            },
        );
        Ok(conversation)
    }

    // -- Messages --

    pub async fn send_message(&self, input: SendMessage) -> Result<Message> {
        match input.kind {
            MessageKind::Text => {
                if input.text.as_deref().is_none_or(|t| t.trim().is_empty()) {
                    return Err(ChatError::Validation(
                        "text messages need a non-empty body".into(),
                    ));
                }
            }
            MessageKind::Image | MessageKind::File => {
                if input.attachment.is_none() {
                    return Err(ChatError::Validation(
                        "image and file messages need an attachment".into(),
                    ));
                }
            }
            MessageKind::System => {}
        }

        self.require_conversation(input.conversation_id)?;
        self.require_member(input.conversation_id, &input.sender_id)?;

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: input.conversation_id,
            sender_id: input.sender_id,
            kind: input.kind,
            text: input.text,
            attachment: input.attachment,
            created_at: now,
            edited_at: None,
            deleted_at: None,
            seq: 0, // assigned by the store
            delivery: Delivery::default(),
        };
        let preview = view::preview_for(message.kind, message.text.as_deref());

        let stored = self.store.append_message(message, preview)?;
        debug!(message_id = %stored.id, conversation_id = %stored.conversation_id, "message sent");

        self.bus.emit(
            &topics::messages(stored.conversation_id),
            ChatEvent::MessageCreated {
                message: stored.clone(),
            },
        );
        Ok(stored)
    }

    /// Sender-only edit of a text message.
    pub async fn edit_message(
        &self,
        message_id: Uuid,
        user_id: &str,
        text: String,
    ) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ChatError::Validation(
                "edited text must be non-empty".into(),
            ));
        }
        let message = self.require_message(message_id)?;
        if message.sender_id != user_id {
            return Err(ChatError::Validation(
                "only the sender can edit a message".into(),
            ));
        }
        if message.kind != MessageKind::Text {
            return Err(ChatError::Validation("only text messages can be edited".into()));
        }
        if message.is_deleted() {
            return Err(ChatError::Validation("deleted messages cannot be edited".into()));
        }

        let preview = view::preview_for(MessageKind::Text, Some(&text));
        let updated = self
            .store
            .update_message_text(message_id, text, Utc::now(), preview)?;

        self.bus.emit(
            &topics::messages(updated.conversation_id),
            ChatEvent::MessageEdited {
                message: updated.clone(),
            },
        );
        Ok(updated)
    }

    /// Sender-only soft delete. Already-deleted messages are left alone.
    pub async fn delete_message(&self, message_id: Uuid, user_id: &str) -> Result<Message> {
        let message = self.require_message(message_id)?;
        if message.sender_id != user_id {
            return Err(ChatError::Validation(
                "only the sender can delete a message".into(),
            ));
        }
        if message.is_deleted() {
            return Ok(message);
        }

        let updated = self.store.tombstone_message(
            message_id,
            Utc::now(),
            view::TOMBSTONE_PREVIEW.to_string(),
        )?;

        self.bus.emit(
            &topics::messages(updated.conversation_id),
            ChatEvent::MessageDeleted {
                conversation_id: updated.conversation_id,
                message_id,
            },
        );
        Ok(updated)
    }

    // -- Reactions --

    /// Idempotent upsert: reacting twice with the same emoji is a no-op
    /// and emits nothing the second time.
    pub async fn add_reaction(&self, input: ReactionInput) -> Result<()> {
        if !view::ALLOWED_EMOJI.contains(&input.emoji.as_str()) {
            return Err(ChatError::Validation(format!(
                "emoji {:?} is not in the reaction set",
                input.emoji
            )));
        }
        let message = self.require_message(input.message_id)?;
        self.require_member(message.conversation_id, &input.user_id)?;

        let added = self.store.upsert_reaction(Reaction {
            id: Uuid::new_v4(),
            message_id: input.message_id,
            user_id: input.user_id.clone(),
            emoji: input.emoji.clone(),
            created_at: Utc::now(),
        })?;

        if added {
            // Scoped to the owning conversation; reaction events are never
            // broadcast wider than the room.
            self.bus.emit(
                &topics::messages(message.conversation_id),
                ChatEvent::ReactionAdded {
                    conversation_id: message.conversation_id,
                    message_id: input.message_id,
                    user_id: input.user_id,
                    emoji: input.emoji,
                },
            );
        }
        Ok(())
    }

    /// Idempotent on absence: removing a reaction that does not exist is a
    /// no-op, not an error.
    pub async fn remove_reaction(&self, input: ReactionInput) -> Result<()> {
        let message = self.require_message(input.message_id)?;

        let removed =
            self.store
                .delete_reaction(input.message_id, &input.user_id, &input.emoji)?;

        if removed {
            self.bus.emit(
                &topics::messages(message.conversation_id),
                ChatEvent::ReactionRemoved {
                    conversation_id: message.conversation_id,
                    message_id: input.message_id,
                    user_id: input.user_id,
                    emoji: input.emoji,
                },
            );
        }
        Ok(())
    }

    // -- Receipts & typing --

    /// Records a read receipt on the named message and advances the
    /// member's `last_read_at` without ever regressing it.
    pub async fn mark_read(&self, input: MarkRead) -> Result<Message> {
        let updated =
            self.store
                .mark_read(input.conversation_id, input.message_id, &input.user_id)?;

        self.bus.emit(
            &topics::messages(input.conversation_id),
            ChatEvent::MessageRead {
                conversation_id: input.conversation_id,
                message_id: input.message_id,
                user_id: input.user_id,
                read_at: Utc::now(),
            },
        );
        Ok(updated)
    }

    /// Pure event emission; nothing is stored and nothing expires here.
    /// Callers send `is_typing: false` after their own inactivity window.
    pub async fn set_typing(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        is_typing: bool,
    ) -> Result<()> {
        self.require_conversation(conversation_id)?;
        self.require_member(conversation_id, user_id)?;

        self.bus.emit(
            &topics::messages(conversation_id),
            ChatEvent::Typing {
                conversation_id,
                user_id: user_id.to_string(),
                is_typing,
            },
        );
        Ok(())
    }

    // -- Group lifecycle --

    pub async fn create_group(&self, input: CreateGroup) -> Result<Conversation> {
        if input.title.trim().is_empty() {
            return Err(ChatError::Validation("group title must be non-empty".into()));
        }

        let mut seen = HashSet::new();
        let member_ids: Vec<UserId> = input
            .member_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if member_ids.is_empty() {
            return Err(ChatError::Validation("a group needs at least one member".into()));
        }
        for id in &member_ids {
            self.require_user(id)?;
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            title: Some(input.title),
            avatar_url: None,
            created_at: now,
            updated_at: now,
            last_message_preview: None,
        };
        let members: Vec<ConversationMember> = member_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let role = if i == 0 { MemberRole::Owner } else { MemberRole::Member };
                member_record(conversation.id, id, role, now)
            })
            .collect();

        self.store
            .insert_conversation(conversation.clone(), members.clone())?;
        info!(conversation_id = %conversation.id, members = members.len(), "group created");

        self.emit_to_members(
            &members,
            ChatEvent::ConversationCreated {
                conversation: conversation.clone(),
            },
        );
        Ok(conversation)
    }

    pub async fn rename_group(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        title: String,
    ) -> Result<Conversation> {
        if title.trim().is_empty() {
            return Err(ChatError::Validation("group title must be non-empty".into()));
        }
        self.require_group(conversation_id)?;
        self.require_member(conversation_id, user_id)?;

        let updated = self.store.rename_conversation(conversation_id, title, Utc::now())?;
        self.notify_conversation_updated(&updated)?;
        Ok(updated)
    }

    pub async fn update_group_photo(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        avatar_url: Option<String>,
    ) -> Result<Conversation> {
        self.require_group(conversation_id)?;
        self.require_member(conversation_id, user_id)?;

        let updated =
            self.store
                .set_conversation_avatar(conversation_id, avatar_url, Utc::now())?;
        self.notify_conversation_updated(&updated)?;
        Ok(updated)
    }

    /// Idempotent: adding a user who is already a member succeeds without
    /// a second membership record or a second round of events.
    pub async fn add_member(&self, conversation_id: Uuid, user_id: &str) -> Result<()> {
        let conversation = self.require_group(conversation_id)?;
        self.require_user(user_id)?;

        let added = self.store.add_member(member_record(
            conversation_id,
            user_id,
            MemberRole::Member,
            Utc::now(),
        ))?;
        if !added {
            return Ok(());
        }

        self.bus.emit(
            &topics::messages(conversation_id),
            ChatEvent::MemberAdded {
                conversation_id,
                user_id: user_id.to_string(),
            },
        );
        // The new member's conversation list just gained an entry.
        self.bus.emit(
            &topics::conversations(user_id),
            ChatEvent::ConversationCreated { conversation },
        );
        Ok(())
    }

    pub async fn remove_member(&self, conversation_id: Uuid, user_id: &str) -> Result<()> {
        self.require_group(conversation_id)?;

        let removed = self.store.remove_member(conversation_id, user_id)?;
        if !removed {
            return Err(ChatError::NotFound("membership"));
        }

        self.bus.emit(
            &topics::messages(conversation_id),
            ChatEvent::MemberRemoved {
                conversation_id,
                user_id: user_id.to_string(),
            },
        );
        self.bus.emit(
            &topics::conversations(user_id),
            ChatEvent::MemberRemoved {
                conversation_id,
                user_id: user_id.to_string(),
            },
        );
        Ok(())
    }

    /// `remove_member` for the caller's own id.
    pub async fn leave_group(&self, conversation_id: Uuid, user_id: &str) -> Result<()> {
        self.remove_member(conversation_id, user_id).await
    }

    /// Member-gated cascade: the conversation, its memberships, messages,
    /// and reactions all go. Access policy beyond membership lives with
    /// the caller.
    pub async fn delete_conversation(&self, conversation_id: Uuid, user_id: &str) -> Result<()> {
        self.require_conversation(conversation_id)?;
        if self.store.get_member(conversation_id, user_id)?.is_none() {
            return Err(ChatError::NotFound("membership"));
        }

        let members = self.store.delete_conversation(conversation_id)?;
        info!(conversation_id = %conversation_id, by = user_id, "conversation deleted");

        self.emit_to_members(&members, ChatEvent::ConversationDeleted { conversation_id });
        Ok(())
    }

    /// Per-member mute flag; list-local state, so no event goes out.
    pub async fn set_muted(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        muted: bool,
    ) -> Result<()> {
        self.require_conversation(conversation_id)?;
        self.store.set_muted(conversation_id, user_id, muted)?;
        Ok(())
    }

    // -- Internals --

    fn require_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.store
            .get_conversation(id)?
            .ok_or(ChatError::NotFound("conversation"))
    }

    fn require_group(&self, id: Uuid) -> Result<Conversation> {
        let conversation = self.require_conversation(id)?;
        if conversation.kind != ConversationKind::Group {
            return Err(ChatError::Validation(
                "direct conversations have fixed membership and metadata".into(),
            ));
        }
        Ok(conversation)
    }

    fn require_member(&self, conversation_id: Uuid, user_id: &str) -> Result<ConversationMember> {
        self.store
            .get_member(conversation_id, user_id)?
            .ok_or_else(|| {
                ChatError::Validation(format!(
                    "user {user_id} is not a member of this conversation"
                ))
            })
    }

    fn require_user(&self, id: &str) -> Result<User> {
        self.store.get_user(id)?.ok_or(ChatError::NotFound("user"))
    }

    fn require_message(&self, id: Uuid) -> Result<Message> {
        self.store
            .get_message(id)?
            .ok_or(ChatError::NotFound("message"))
    }

    fn notify_conversation_updated(&self, conversation: &Conversation) -> Result<()> {
        let members = self.store.list_members(conversation.id)?;
        self.emit_to_members(
            &members,
            ChatEvent::ConversationUpdated {
                conversation: conversation.clone(),
            },
        );
        Ok(())
    }

    fn emit_to_members(&self, members: &[ConversationMember], event: ChatEvent) {
        for member in members {
            self.bus
                .emit(&topics::conversations(&member.user_id), event.clone());
        }
    }
}

fn member_record(
    conversation_id: Uuid,
    user_id: &str,
    role: MemberRole,
    joined_at: chrono::DateTime<Utc>,
) -> ConversationMember {
    ConversationMember {
        conversation_id,
        user_id: user_id.to_string(),
        role,
        muted: false,
        last_read_at: None,
        joined_at,
    }
}
