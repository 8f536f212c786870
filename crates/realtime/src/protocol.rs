//! Wire protocol envelopes for real-time chat traffic.
//!
//! Every frame is a JSON object tagged by `type` (snake_case), with
//! camelCase payload fields. Envelopes with an unknown tag decode to the
//! explicit [`ClientEvent::Unrecognized`]/[`ServerEvent::Unrecognized`]
//! variant; receivers drop those instead of treating them as errors.

use serde::{Deserialize, Serialize};

/// Hydrated sender identity carried inside a `new_message` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderPayload {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

/// A persisted message as delivered to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_from_ai: bool,
    pub status: String,
    pub created_at: String,
    pub sender: SenderPayload,
}

/// Envelopes sent from clients to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Declare which chat this connection is currently viewing.
    JoinChat { user_id: String, chat_id: String },
    /// Ephemeral typing signal for the declared chat.
    Typing {
        user_id: String,
        chat_id: String,
        is_typing: bool,
    },
    /// Any envelope whose `type` the server does not know.
    #[serde(other)]
    Unrecognized,
}

/// Envelopes sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A message was persisted in a chat this connection is scoped to.
    NewMessage { message: MessagePayload },
    /// Another participant's typing state changed.
    UserTyping { user_id: String, is_typing: bool },
    /// Any envelope whose `type` the client does not know.
    #[serde(other)]
    Unrecognized,
}
