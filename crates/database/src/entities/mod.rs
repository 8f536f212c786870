//! Entity definitions for the Parley store.

pub mod chat;
pub mod message;
pub mod participant;
pub mod user;

pub use chat::{Chat, ChatKind, CreateChatRequest};
pub use message::{CreateMessageRequest, Message, MessageStatus, MessageWithSender};
pub use participant::{ChatParticipant, CreateParticipantRequest};
pub use user::{UpsertUser, User};
