use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, Message, UserId};

/// Events published on the bus after a service operation commits.
///
/// Message-scoped events go out on `messages:<conversationId>`;
/// list-scoped events go out on `conversations:<userId>`, once per
/// affected member. Every event carries its conversation id so a
/// subscriber never has to guess the scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// A conversation the recipient belongs to was created.
    ConversationCreated { conversation: Conversation },

    /// Title or avatar changed on a conversation the recipient belongs to.
    ConversationUpdated { conversation: Conversation },

    /// A conversation was deleted; all of its contents are gone.
    ConversationDeleted { conversation_id: Uuid },

    /// A user joined a group conversation.
    MemberAdded { conversation_id: Uuid, user_id: UserId },

    /// A user left or was removed from a group conversation.
    MemberRemoved { conversation_id: Uuid, user_id: UserId },

    /// A new message was posted.
    MessageCreated { message: Message },

    /// A message's text was edited by its sender.
    MessageEdited { message: Message },

    /// A message was soft-deleted; only a tombstone remains visible.
    MessageDeleted { conversation_id: Uuid, message_id: Uuid },

    /// A member read a message.
    MessageRead {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: UserId,
        read_at: DateTime<Utc>,
    },

    /// A reaction was added to a message.
    ReactionAdded {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: UserId,
        emoji: String,
    },

    /// A reaction was removed from a message.
    ReactionRemoved {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: UserId,
        emoji: String,
    },

    /// A member started or stopped typing. Ephemeral; nothing is stored,
    /// and the core never times this out on its own.
    Typing {
        conversation_id: Uuid,
        user_id: UserId,
        is_typing: bool,
    },
}

impl ChatEvent {
    /// The conversation this event belongs to, if any.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::ConversationCreated { conversation }
            | Self::ConversationUpdated { conversation } => Some(conversation.id),
            Self::ConversationDeleted { conversation_id }
            | Self::MemberAdded { conversation_id, .. }
            | Self::MemberRemoved { conversation_id, .. }
            | Self::MessageDeleted { conversation_id, .. }
            | Self::MessageRead { conversation_id, .. }
            | Self::ReactionAdded { conversation_id, .. }
            | Self::ReactionRemoved { conversation_id, .. }
            | Self::Typing { conversation_id, .. } => Some(*conversation_id),
            Self::MessageCreated { message } | Self::MessageEdited { message } => {
                Some(message.conversation_id)
            }
        }
    }
}
