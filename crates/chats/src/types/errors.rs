//! Error types for the chat domain.

use thiserror::Error;

use crate::services::completion_service::CompletionError;
use parley_database::StoreError;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message content must not be empty")]
    EmptyContent,

    #[error("chat not found: {id}")]
    ChatNotFound { id: String },

    #[error("message not found: {id}")]
    MessageNotFound { id: String },

    #[error("chat {id} does not have an assistant")]
    NotAssistantChat { id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl ChatError {
    pub fn chat_not_found(id: impl Into<String>) -> Self {
        Self::ChatNotFound { id: id.into() }
    }

    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    pub fn not_assistant_chat(id: impl Into<String>) -> Self {
        Self::NotAssistantChat { id: id.into() }
    }
}
