//! Message pipeline: the end-to-end path from submitted content to
//! delivered message(s).
//!
//! A submission is validated, persisted, hydrated, and broadcast to every
//! connection scoped to its chat. Messages are always durably persisted
//! before any broadcast is attempted, so a delivery failure never loses
//! data. When the chat carries an assistant, a detached continuation
//! generates the reply and runs it through the identical persist-then-
//! broadcast tail; the submitting request never waits for it.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use parley_database::{
    ChatKind, ChatRepository, CreateMessageRequest, MessageRepository, MessageWithSender,
};
use parley_realtime::{Broadcaster, MessagePayload, SenderPayload, ServerEvent};

use super::completion_service::{CompletionService, ConversationTurn, TurnRole};
use crate::types::{ChatError, ChatResult};

/// How many stored messages are fetched when building assistant context.
const HISTORY_FETCH_LIMIT: i64 = 10;

/// How many of the fetched messages are forwarded to the provider. Keeps
/// request size and latency bounded.
const HISTORY_TURNS: usize = 5;

/// Orchestrates ingest → persist → broadcast → assistant continuation.
#[derive(Clone)]
pub struct MessageService {
    messages: MessageRepository,
    chats: ChatRepository,
    broadcaster: Broadcaster,
    completions: Arc<CompletionService>,
    bot_user_id: String,
}

impl MessageService {
    pub fn new(
        pool: SqlitePool,
        broadcaster: Broadcaster,
        completions: Arc<CompletionService>,
        bot_user_id: String,
    ) -> Self {
        Self {
            messages: MessageRepository::new(pool.clone()),
            chats: ChatRepository::new(pool),
            broadcaster,
            completions,
            bot_user_id,
        }
    }

    /// Persist and deliver a submitted message.
    ///
    /// The broadcast excludes nobody: the submitter's other connections
    /// receive the event too, and the returned payload is the source of
    /// truth for the submitting client itself. For an `ai_bot` chat a
    /// detached assistant continuation is spawned after the human message
    /// is already persisted and broadcast.
    pub async fn submit(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> ChatResult<MessagePayload> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }

        let chat = self
            .chats
            .find_by_id(chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))?;

        let payload = self
            .persist_and_broadcast(chat_id, sender_id, content, false)
            .await?;

        if chat.kind == ChatKind::AiBot {
            self.spawn_assistant_reply(chat_id.to_string(), content.to_string());
        }

        Ok(payload)
    }

    /// Hydrated recent messages of a chat, oldest first.
    pub async fn history(&self, chat_id: &str, limit: i64) -> ChatResult<Vec<MessagePayload>> {
        let messages = self.messages.recent_with_sender(chat_id, limit).await?;
        Ok(messages.iter().map(message_payload).collect())
    }

    /// Recent conversation context for the assistant: the last
    /// `HISTORY_TURNS` of up to `HISTORY_FETCH_LIMIT` stored messages,
    /// oldest first, mapped to role/content pairs by `is_from_ai`.
    pub async fn conversation_history(&self, chat_id: &str) -> ChatResult<Vec<ConversationTurn>> {
        let recent = self
            .messages
            .recent_with_sender(chat_id, HISTORY_FETCH_LIMIT)
            .await?;

        let skip = recent.len().saturating_sub(HISTORY_TURNS);
        Ok(recent[skip..]
            .iter()
            .map(|record| ConversationTurn {
                role: if record.message.is_from_ai {
                    TurnRole::Assistant
                } else {
                    TurnRole::User
                },
                content: record.message.content.clone(),
            })
            .collect())
    }

    /// Detached continuation: generate, persist, and broadcast the
    /// assistant reply. Only ever used for its side effects; failures are
    /// logged and dropped because the human message path has already
    /// succeeded.
    fn spawn_assistant_reply(&self, chat_id: String, prompt: String) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(error) = service.assistant_reply(&chat_id, &prompt).await {
                warn!(%chat_id, %error, "assistant reply failed");
            }
        });
    }

    async fn assistant_reply(&self, chat_id: &str, prompt: &str) -> ChatResult<()> {
        let history = self.conversation_history(chat_id).await?;
        let reply = self.completions.generate(prompt, &history).await;

        let bot_user_id = self.bot_user_id.clone();
        self.persist_and_broadcast(chat_id, &bot_user_id, &reply, true)
            .await?;

        info!(%chat_id, "assistant reply delivered");
        Ok(())
    }

    async fn persist_and_broadcast(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        is_from_ai: bool,
    ) -> ChatResult<MessagePayload> {
        let message = self
            .messages
            .create(&CreateMessageRequest {
                chat_id: chat_id.to_string(),
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                is_from_ai,
            })
            .await?;

        let hydrated = self
            .messages
            .find_with_sender(&message.id)
            .await?
            .ok_or_else(|| ChatError::message_not_found(&message.id))?;
        let payload = message_payload(&hydrated);

        self.broadcaster.broadcast(
            chat_id,
            &ServerEvent::NewMessage {
                message: payload.clone(),
            },
            None,
        );

        Ok(payload)
    }
}

/// Wire shape of a hydrated message.
pub fn message_payload(record: &MessageWithSender) -> MessagePayload {
    MessagePayload {
        id: record.message.id.clone(),
        chat_id: record.message.chat_id.clone(),
        sender_id: record.message.sender_id.clone(),
        content: record.message.content.clone(),
        is_from_ai: record.message.is_from_ai,
        status: record.message.status.as_str().to_string(),
        created_at: record.message.created_at.clone(),
        sender: SenderPayload {
            id: record.sender.id.clone(),
            email: record.sender.email.clone(),
            first_name: record.sender.first_name.clone(),
            last_name: record.sender.last_name.clone(),
            profile_image_url: record.sender.profile_image_url.clone(),
        },
    }
}
