//! Chat management endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use parley_chats::ChatSummary;
use parley_database::{Chat, ChatKind};

use crate::error::ApiError;
use crate::identity::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatBody {
    pub name: Option<String>,
    #[serde(default = "default_chat_kind")]
    pub kind: ChatKind,
}

fn default_chat_kind() -> ChatKind {
    ChatKind::Direct
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let chats = state.chat_service.list_chats(user.id()).await?;
    Ok(Json(chats))
}

/// POST /api/chats
pub async fn create_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateChatBody>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state
        .chat_service
        .create_chat(user.id(), body.name, body.kind)
        .await?;
    Ok(Json(chat))
}

/// GET /api/chats/{chat_id}
pub async fn get_chat(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(chat_id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state.chat_service.get_chat(&chat_id).await?;
    Ok(Json(chat))
}
