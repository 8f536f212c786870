//! # Parley Gateway Crate
//!
//! HTTP and WebSocket surface for the Parley chat relay: REST endpoints
//! for chats, message history, the message pipeline, and the streaming
//! assistant, plus the `/ws` endpoint feeding the connection registry.
//!
//! Identity is resolved by an upstream authenticating proxy; see
//! [`identity::CurrentUser`].

pub mod error;
pub mod identity;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use identity::CurrentUser;
pub use state::AppState;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the main application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(rest::health::health))
        .route(
            "/api/chats",
            get(rest::chat::list_chats).post(rest::chat::create_chat),
        )
        .route("/api/chats/:chat_id", get(rest::chat::get_chat))
        .route(
            "/api/chats/:chat_id/messages",
            get(rest::message::list_messages).post(rest::message::create_message),
        )
        .route(
            "/api/chats/:chat_id/ai-stream",
            post(rest::ai_stream::stream_assistant_reply),
        )
        .route("/ws", get(websocket::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .with_state(state)
}
