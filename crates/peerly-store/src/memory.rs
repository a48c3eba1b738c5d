//! In-memory [`Store`] implementation.
//!
//! One mutex guards all collections, so every trait method is a single
//! critical section and partial mutations are never observable.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use peerly_types::models::{
    Conversation, ConversationKind, ConversationMember, Message, Reaction, User, UserId,
};

use crate::{Result, Store, StoreError};

pub struct MemoryStore {
    inner: Mutex<Collections>,
}

#[derive(Default)]
struct Collections {
    users: HashMap<UserId, User>,
    conversations: HashMap<Uuid, Conversation>,
    /// Uniqueness index for direct conversations, keyed on the sorted pair.
    direct_pairs: HashMap<(UserId, UserId), Uuid>,
    /// Memberships by conversation id.
    members: HashMap<Uuid, Vec<ConversationMember>>,
    messages: HashMap<Uuid, Message>,
    /// Message ids per conversation, in total order.
    timelines: HashMap<Uuid, Vec<Uuid>>,
    /// Reactions by message id.
    reactions: HashMap<Uuid, Vec<Reaction>>,
    next_seq: u64,
}

fn direct_key(user_a: &str, user_b: &str) -> (UserId, UserId) {
    if user_a <= user_b {
        (user_a.to_string(), user_b.to_string())
    } else {
        (user_b.to_string(), user_a.to_string())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Collections::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Collections {
    fn message_mut(&mut self, id: Uuid) -> Result<&mut Message> {
        self.messages
            .get_mut(&id)
            .ok_or(StoreError::NotFound("message"))
    }

    /// Is `message_id` the newest entry in its conversation's timeline?
    fn is_latest(&self, conversation_id: Uuid, message_id: Uuid) -> bool {
        self.timelines
            .get(&conversation_id)
            .and_then(|timeline| timeline.last())
            .is_some_and(|last| *last == message_id)
    }

    fn set_preview(&mut self, conversation_id: Uuid, preview: String, at: DateTime<Utc>) {
        if let Some(conversation) = self.conversations.get_mut(&conversation_id) {
            conversation.last_message_preview = Some(preview);
            conversation.updated_at = at;
        }
    }
}

impl Store for MemoryStore {
    // -- Users --

    fn upsert_user(&self, user: User) -> Result<()> {
        self.lock().users.insert(user.id.clone(), user);
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.lock().users.get(id).cloned())
    }

    // -- Conversations --

    fn insert_conversation(
        &self,
        conversation: Conversation,
        members: Vec<ConversationMember>,
    ) -> Result<()> {
        let mut inner = self.lock();

        if inner.conversations.contains_key(&conversation.id) {
            return Err(StoreError::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }

        if conversation.kind == ConversationKind::Direct {
            if members.len() != 2 {
                return Err(StoreError::Conflict(
                    "direct conversation requires exactly two members".into(),
                ));
            }
            let key = direct_key(&members[0].user_id, &members[1].user_id);
            if inner.direct_pairs.contains_key(&key) {
                return Err(StoreError::Conflict(format!(
                    "direct conversation between {} and {} already exists",
                    key.0, key.1
                )));
            }
            inner.direct_pairs.insert(key, conversation.id);
        }

        inner.timelines.insert(conversation.id, Vec::new());
        inner.members.insert(conversation.id, members);
        inner.conversations.insert(conversation.id, conversation);
        Ok(())
    }

    fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.lock().conversations.get(&id).cloned())
    }

    fn find_direct(&self, user_a: &str, user_b: &str) -> Result<Option<Conversation>> {
        let inner = self.lock();
        let id = inner.direct_pairs.get(&direct_key(user_a, user_b));
        Ok(id.and_then(|id| inner.conversations.get(id)).cloned())
    }

    fn list_conversations_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let inner = self.lock();
        let mut found: Vec<Conversation> = inner
            .members
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m.user_id == user_id))
            .filter_map(|(id, _)| inner.conversations.get(id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    fn rename_conversation(
        &self,
        id: Uuid,
        title: String,
        at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let mut inner = self.lock();
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("conversation"))?;
        conversation.title = Some(title);
        conversation.updated_at = at;
        Ok(conversation.clone())
    }

    fn set_conversation_avatar(
        &self,
        id: Uuid,
        avatar_url: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let mut inner = self.lock();
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("conversation"))?;
        conversation.avatar_url = avatar_url;
        conversation.updated_at = at;
        Ok(conversation.clone())
    }

    fn delete_conversation(&self, id: Uuid) -> Result<Vec<ConversationMember>> {
        let mut inner = self.lock();
        let conversation = inner
            .conversations
            .remove(&id)
            .ok_or(StoreError::NotFound("conversation"))?;

        let members = inner.members.remove(&id).unwrap_or_default();

        if conversation.kind == ConversationKind::Direct && members.len() == 2 {
            let key = direct_key(&members[0].user_id, &members[1].user_id);
            inner.direct_pairs.remove(&key);
        }

        let timeline = inner.timelines.remove(&id).unwrap_or_default();
        for message_id in &timeline {
            inner.messages.remove(message_id);
            inner.reactions.remove(message_id);
        }

        debug!(
            conversation_id = %id,
            messages = timeline.len(),
            members = members.len(),
            "conversation deleted"
        );
        Ok(members)
    }

    // -- Members --

    fn get_member(
        &self,
        conversation_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ConversationMember>> {
        let inner = self.lock();
        Ok(inner
            .members
            .get(&conversation_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id))
            .cloned())
    }

    fn list_members(&self, conversation_id: Uuid) -> Result<Vec<ConversationMember>> {
        let inner = self.lock();
        inner
            .members
            .get(&conversation_id)
            .cloned()
            .ok_or(StoreError::NotFound("conversation"))
    }

    fn add_member(&self, member: ConversationMember) -> Result<bool> {
        let mut inner = self.lock();
        let members = inner
            .members
            .get_mut(&member.conversation_id)
            .ok_or(StoreError::NotFound("conversation"))?;
        if members.iter().any(|m| m.user_id == member.user_id) {
            return Ok(false);
        }
        members.push(member);
        Ok(true)
    }

    fn remove_member(&self, conversation_id: Uuid, user_id: &str) -> Result<bool> {
        let mut inner = self.lock();
        let members = inner
            .members
            .get_mut(&conversation_id)
            .ok_or(StoreError::NotFound("conversation"))?;
        let before = members.len();
        members.retain(|m| m.user_id != user_id);
        Ok(members.len() < before)
    }

    fn set_muted(&self, conversation_id: Uuid, user_id: &str, muted: bool) -> Result<()> {
        let mut inner = self.lock();
        let member = inner
            .members
            .get_mut(&conversation_id)
            .and_then(|members| members.iter_mut().find(|m| m.user_id == user_id))
            .ok_or(StoreError::NotFound("membership"))?;
        member.muted = muted;
        Ok(())
    }

    // -- Messages --

    fn append_message(&self, mut message: Message, preview: String) -> Result<Message> {
        let mut inner = self.lock();
        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound("conversation"));
        }

        message.seq = inner.next_seq;
        inner.next_seq += 1;

        let conversation_id = message.conversation_id;
        let at = message.created_at;
        inner
            .timelines
            .entry(conversation_id)
            .or_default()
            .push(message.id);
        inner.messages.insert(message.id, message.clone());
        inner.set_preview(conversation_id, preview, at);
        Ok(message)
    }

    fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.lock().messages.get(&id).cloned())
    }

    fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
        before: Option<Uuid>,
    ) -> Result<Vec<Message>> {
        let inner = self.lock();
        let timeline = inner
            .timelines
            .get(&conversation_id)
            .ok_or(StoreError::NotFound("conversation"))?;

        let end = match before {
            Some(cursor) => timeline
                .iter()
                .position(|id| *id == cursor)
                .ok_or(StoreError::NotFound("message"))?,
            None => timeline.len(),
        };
        let start = end.saturating_sub(limit);

        Ok(timeline[start..end]
            .iter()
            .filter_map(|id| inner.messages.get(id))
            .cloned()
            .collect())
    }

    fn update_message_text(
        &self,
        message_id: Uuid,
        text: String,
        at: DateTime<Utc>,
        preview: String,
    ) -> Result<Message> {
        let mut inner = self.lock();
        let message = inner.message_mut(message_id)?;
        message.text = Some(text);
        message.edited_at = Some(at);
        let updated = message.clone();

        if inner.is_latest(updated.conversation_id, message_id) {
            inner.set_preview(updated.conversation_id, preview, at);
        }
        Ok(updated)
    }

    fn tombstone_message(
        &self,
        message_id: Uuid,
        at: DateTime<Utc>,
        preview: String,
    ) -> Result<Message> {
        let mut inner = self.lock();
        let message = inner.message_mut(message_id)?;
        message.deleted_at = Some(at);
        let updated = message.clone();

        if inner.is_latest(updated.conversation_id, message_id) {
            inner.set_preview(updated.conversation_id, preview, at);
        }
        Ok(updated)
    }

    fn mark_read(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: &str,
    ) -> Result<Message> {
        let mut inner = self.lock();

        let (sender_id, read_at) = {
            let message = inner
                .messages
                .get(&message_id)
                .filter(|m| m.conversation_id == conversation_id)
                .ok_or(StoreError::NotFound("message"))?;
            (message.sender_id.clone(), message.created_at)
        };

        // Resolve the membership before writing anything; a failed call
        // must leave no receipt behind.
        let member = inner
            .members
            .get_mut(&conversation_id)
            .and_then(|members| members.iter_mut().find(|m| m.user_id == user_id))
            .ok_or(StoreError::NotFound("membership"))?;
        if member.last_read_at.is_none_or(|prev| prev < read_at) {
            member.last_read_at = Some(read_at);
        }

        let message = inner.message_mut(message_id)?;
        // Reading implies delivery; the sender never appears in either set.
        if sender_id != user_id {
            message.delivery.delivered_to.insert(user_id.to_string());
            message.delivery.read_by.insert(user_id.to_string());
        }
        Ok(message.clone())
    }

    // -- Reactions --

    fn upsert_reaction(&self, reaction: Reaction) -> Result<bool> {
        let mut inner = self.lock();
        if !inner.messages.contains_key(&reaction.message_id) {
            return Err(StoreError::NotFound("message"));
        }
        let reactions = inner.reactions.entry(reaction.message_id).or_default();
        if reactions
            .iter()
            .any(|r| r.user_id == reaction.user_id && r.emoji == reaction.emoji)
        {
            return Ok(false);
        }
        reactions.push(reaction);
        Ok(true)
    }

    fn delete_reaction(&self, message_id: Uuid, user_id: &str, emoji: &str) -> Result<bool> {
        let mut inner = self.lock();
        let Some(reactions) = inner.reactions.get_mut(&message_id) else {
            return Ok(false);
        };
        let before = reactions.len();
        reactions.retain(|r| !(r.user_id == user_id && r.emoji == emoji));
        Ok(reactions.len() < before)
    }

    fn reactions_for_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Reaction>> {
        let inner = self.lock();
        Ok(message_ids
            .iter()
            .filter_map(|id| inner.reactions.get(id))
            .flat_map(|reactions| reactions.iter().cloned())
            .collect())
    }
}
