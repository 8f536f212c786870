//! # Parley Chats Crate
//!
//! Chat domain services: chat management, the message pipeline
//! (validate → persist → broadcast → detached assistant continuation), and
//! the completion client that generates assistant replies.

pub mod services;
pub mod types;

pub use services::{
    message_payload, ChatService, ChatSummary, CompletionError, CompletionService,
    ConversationTurn, MessageService, TurnRole, EMPTY_REPLY, FAILURE_REPLY,
};
pub use types::{ChatError, ChatResult};
