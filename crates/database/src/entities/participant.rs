//! Chat participant entity definitions

use serde::{Deserialize, Serialize};

/// Membership record tying a user to a chat. A user may belong to many
/// chats and a chat to many users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: String,
    pub chat_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParticipantRequest {
    pub chat_id: String,
    pub user_id: String,
    pub is_admin: bool,
}
