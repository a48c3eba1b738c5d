use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ids come from the external identity provider and are opaque strings.
pub type UserId = String;

/// A profile as the identity provider hands it to us. The messaging core
/// never mutates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// A container for messages between two or more users.
///
/// A `Direct` conversation has exactly two members for its lifetime. A
/// `Group` conversation has at least one member and exactly one `Owner`
/// at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    /// Group conversations only; direct conversations render the peer's name.
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every sent message and on metadata/membership changes.
    pub updated_at: DateTime<Utc>,
    /// Denormalized text of the latest message, for conversation lists.
    pub last_message_preview: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

/// Join record of a user to a conversation. At most one per
/// (conversation, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMember {
    pub conversation_id: Uuid,
    pub user_id: UserId,
    pub role: MemberRole,
    pub muted: bool,
    /// Advances monotonically; never regresses.
    pub last_read_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

/// Reference to externally-hosted attachment content. Upload and hosting
/// happen outside the core; we keep only the pointer and display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Per-message receipt tracking.
///
/// Invariants: `read_by` is a subset of `delivered_to` (reading a message
/// implies it was delivered), and the sender never appears in `read_by`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delivery {
    pub delivered_to: BTreeSet<UserId>,
    pub read_by: BTreeSet<UserId>,
}

/// A message within a conversation.
///
/// Messages are totally ordered by `(created_at, seq)`; `seq` is assigned
/// by the store at append time and is strictly monotonic, so two messages
/// created in the same millisecond still have a stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    /// Soft-delete tombstone. Content is hidden in views but the record
    /// stays for ordering and as a reaction anchor.
    pub deleted_at: Option<DateTime<Utc>>,
    pub seq: u64,
    pub delivery: Delivery,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A single emoji reaction. At most one per (message, user, emoji) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// Reactions on one message collapsed by emoji, for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<UserId>,
}
