//! # peerly-chat
//!
//! The messaging service for the Peerly tutoring app: conversation
//! listing, keyset-paginated message history, sends, reactions, read
//! receipts, typing, and group lifecycle.
//!
//! The service orchestrates two collaborators it does not own: a
//! [`peerly_store::Store`] holding the authoritative state, and a
//! [`peerly_bus::EventBus`] carrying best-effort change notifications.
//! Consumers that miss an event re-fetch through the service rather than
//! assuming gap-free delivery.

pub mod error;
pub mod service;
pub mod view;

pub use error::ChatError;
pub use service::{
    ChatService, CreateGroup, ListOptions, MarkRead, MessageQuery, ReactionInput, SendMessage,
};
pub use view::MessageView;
