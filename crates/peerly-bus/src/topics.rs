//! Topic naming shared by publishers and subscribers.
//!
//! Every event is scoped to exactly one conversation or one user; there is
//! deliberately no wildcard topic, so no subscriber ever has to filter out
//! traffic it did not ask for.

use uuid::Uuid;

/// List-level changes for one user: conversations appearing, changing
/// metadata, or disappearing from their list.
pub fn conversations(user_id: &str) -> String {
    format!("conversations:{user_id}")
}

/// Message-level changes inside one conversation: new messages, edits,
/// reactions, read receipts, typing.
pub fn messages(conversation_id: Uuid) -> String {
    format!("messages:{conversation_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_are_stable() {
        assert_eq!(conversations("u-1"), "conversations:u-1");

        let id = Uuid::nil();
        assert_eq!(messages(id), format!("messages:{id}"));
    }
}
