//! Message endpoints: history retrieval and the pipeline entrypoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use parley_realtime::MessagePayload;

use crate::error::ApiError;
use crate::identity::CurrentUser;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub content: String,
}

/// GET /api/chats/{chat_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(chat_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);
    let messages = state.message_service.history(&chat_id, limit).await?;
    Ok(Json(messages))
}

/// POST /api/chats/{chat_id}/messages
///
/// Runs the full pipeline; the response body is the persisted, hydrated
/// message and is the source of truth for the submitting client.
pub async fn create_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(chat_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<MessagePayload>, ApiError> {
    let message = state
        .message_service
        .submit(&chat_id, user.id(), &body.content)
        .await?;
    Ok(Json(message))
}
