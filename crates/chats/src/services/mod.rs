//! Domain services for the chat system.

pub mod chat_service;
pub mod completion_service;
pub mod message_service;

pub use chat_service::{ChatService, ChatSummary};
pub use completion_service::{
    CompletionError, CompletionService, ConversationTurn, TurnRole, EMPTY_REPLY, FAILURE_REPLY,
};
pub use message_service::{message_payload, MessageService};
