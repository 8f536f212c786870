//! Streaming assistant endpoint.
//!
//! Returns the assistant reply as a chunked plain-text body of raw
//! fragments, forwarded as they arrive from the provider. This path never
//! persists the submitted content; callers that want the exchange stored
//! go through the regular message endpoint.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;

use parley_chats::ChatError;
use parley_database::ChatKind;

use crate::error::ApiError;
use crate::identity::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AiStreamBody {
    pub content: String,
}

/// POST /api/chats/{chat_id}/ai-stream
pub async fn stream_assistant_reply(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(chat_id): Path<String>,
    Json(body): Json<AiStreamBody>,
) -> Result<Response, ApiError> {
    let chat = state.chat_service.get_chat(&chat_id).await?;
    if chat.kind != ChatKind::AiBot {
        return Err(ChatError::not_assistant_chat(&chat_id).into());
    }

    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(ChatError::EmptyContent.into());
    }

    let history = state.message_service.conversation_history(&chat_id).await?;
    let fragments = state
        .completion_service
        .generate_streaming(&content, &history)
        .await
        .map_err(ChatError::from)?;

    // A mid-stream provider error terminates the body; nothing is
    // fabricated on behalf of the assistant.
    let body = Body::from_stream(fragments.map(|fragment| fragment.map(Bytes::from)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .map_err(|error| ApiError::Internal(error.to_string()))
}
