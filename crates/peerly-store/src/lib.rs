//! # peerly-store
//!
//! The Domain Store: the authoritative collections of users, conversations,
//! members, messages, and reactions. All service operations read and write
//! through the [`Store`] trait; the bus only ever carries change
//! notifications derived from state already committed here.
//!
//! [`MemoryStore`] is the single-process implementation. A persistent
//! backend (SQL tables, a log) slots in behind the same trait without
//! touching the service layer.

pub mod memory;

mod error;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use peerly_types::models::{
    Conversation, ConversationMember, Message, Reaction, User,
};

pub use error::StoreError;
pub use memory::MemoryStore;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage seam for the messaging core.
///
/// Each method is one atomic unit: from the caller's perspective a mutation
/// either fully applies or leaves the store untouched. Reads never mutate.
pub trait Store: Send + Sync {
    // -- Users --

    /// Cache a profile from the identity provider.
    fn upsert_user(&self, user: User) -> Result<()>;

    fn get_user(&self, id: &str) -> Result<Option<User>>;

    // -- Conversations --

    /// Create a conversation together with its initial members.
    ///
    /// Direct conversations must come with exactly two members and fail
    /// with [`StoreError::Conflict`] if the pair already has one.
    fn insert_conversation(
        &self,
        conversation: Conversation,
        members: Vec<ConversationMember>,
    ) -> Result<()>;

    fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// The unique direct conversation between two users, if it exists.
    fn find_direct(&self, user_a: &str, user_b: &str) -> Result<Option<Conversation>>;

    /// Conversations the user belongs to, newest `updated_at` first.
    fn list_conversations_for_user(&self, user_id: &str) -> Result<Vec<Conversation>>;

    fn rename_conversation(&self, id: Uuid, title: String, at: DateTime<Utc>)
    -> Result<Conversation>;

    fn set_conversation_avatar(
        &self,
        id: Uuid,
        avatar_url: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Conversation>;

    /// Remove a conversation and cascade to its members, messages, and
    /// reactions. Returns the memberships that were removed.
    fn delete_conversation(&self, id: Uuid) -> Result<Vec<ConversationMember>>;

    // -- Members --

    fn get_member(&self, conversation_id: Uuid, user_id: &str)
    -> Result<Option<ConversationMember>>;

    fn list_members(&self, conversation_id: Uuid) -> Result<Vec<ConversationMember>>;

    /// Returns `false` when the membership already existed (no-op).
    fn add_member(&self, member: ConversationMember) -> Result<bool>;

    /// Returns `false` when there was no membership to remove.
    fn remove_member(&self, conversation_id: Uuid, user_id: &str) -> Result<bool>;

    fn set_muted(&self, conversation_id: Uuid, user_id: &str, muted: bool) -> Result<()>;

    // -- Messages --

    /// Append to the conversation's timeline, assign the order-breaking
    /// sequence number, and refresh the parent's `updated_at` and preview,
    /// all in one step. Returns the stored message.
    fn append_message(&self, message: Message, preview: String) -> Result<Message>;

    fn get_message(&self, id: Uuid) -> Result<Option<Message>>;

    /// An ascending page of up to `limit` messages strictly before
    /// `before` (or the newest page when `before` is `None`).
    fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
        before: Option<Uuid>,
    ) -> Result<Vec<Message>>;

    /// Replace the text of a message and stamp `edited_at`. `preview` is
    /// applied to the parent conversation only if this is its latest
    /// message.
    fn update_message_text(
        &self,
        message_id: Uuid,
        text: String,
        at: DateTime<Utc>,
        preview: String,
    ) -> Result<Message>;

    /// Soft-delete: stamp `deleted_at`, keep the record. Same conditional
    /// preview rule as [`Store::update_message_text`].
    fn tombstone_message(
        &self,
        message_id: Uuid,
        at: DateTime<Utc>,
        preview: String,
    ) -> Result<Message>;

    /// Record that `user_id` read the message: adds them to `read_by` and
    /// `delivered_to` (unless they are the sender) and advances the
    /// membership's `last_read_at` monotonically. Returns the updated
    /// message.
    fn mark_read(&self, conversation_id: Uuid, message_id: Uuid, user_id: &str)
    -> Result<Message>;

    // -- Reactions --

    /// Returns `false` when the (message, user, emoji) triple already had a
    /// reaction (no-op).
    fn upsert_reaction(&self, reaction: Reaction) -> Result<bool>;

    /// Returns `false` when there was nothing to remove.
    fn delete_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str) -> Result<bool>;

    /// Batch-fetch reactions for a page of messages.
    fn reactions_for_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Reaction>>;
}
