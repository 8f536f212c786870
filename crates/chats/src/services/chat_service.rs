//! Chat management: creation, lookup, and per-user listings.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use parley_database::{
    Chat, ChatKind, ChatRepository, CreateChatRequest, CreateParticipantRequest, Message,
    MessageRepository, ParticipantRepository,
};

use crate::types::{ChatError, ChatResult};

/// A chat as shown in a user's conversation list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub last_message: Option<Message>,
}

#[derive(Clone)]
pub struct ChatService {
    chats: ChatRepository,
    participants: ParticipantRepository,
    messages: MessageRepository,
}

impl ChatService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            chats: ChatRepository::new(pool.clone()),
            participants: ParticipantRepository::new(pool.clone()),
            messages: MessageRepository::new(pool),
        }
    }

    /// Create a chat; the creator becomes its admin participant.
    pub async fn create_chat(
        &self,
        created_by: &str,
        name: Option<String>,
        kind: ChatKind,
    ) -> ChatResult<Chat> {
        let chat = self
            .chats
            .create(&CreateChatRequest {
                name,
                kind,
                created_by: Some(created_by.to_string()),
            })
            .await?;

        self.participants
            .add(&CreateParticipantRequest {
                chat_id: chat.id.clone(),
                user_id: created_by.to_string(),
                is_admin: true,
            })
            .await?;

        info!(chat_id = %chat.id, created_by, "chat created");
        Ok(chat)
    }

    pub async fn get_chat(&self, chat_id: &str) -> ChatResult<Chat> {
        self.chats
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))
    }

    /// The user's chats, each with its most recent message.
    pub async fn list_chats(&self, user_id: &str) -> ChatResult<Vec<ChatSummary>> {
        let chats = self.chats.list_for_user(user_id).await?;

        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            let last_message = self.messages.last_for_chat(&chat.id).await?;
            summaries.push(ChatSummary { chat, last_message });
        }

        Ok(summaries)
    }
}
