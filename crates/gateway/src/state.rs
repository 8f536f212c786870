//! Shared application state for the gateway

use std::sync::Arc;

use sqlx::SqlitePool;

use parley_chats::{ChatError, ChatService, CompletionService, MessageService};
use parley_config::AppConfig;
use parley_realtime::{Broadcaster, ConnectionRegistry};

/// Shared application state containing all services.
///
/// The connection registry is owned here and injected into the broadcaster
/// and handlers; nothing holds it as a hidden global.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub pool: SqlitePool,
    /// Live connection registry
    pub registry: Arc<ConnectionRegistry>,
    /// Chat-scoped event fan-out
    pub broadcaster: Broadcaster,
    /// Chat service
    pub chat_service: Arc<ChatService>,
    /// Message pipeline
    pub message_service: Arc<MessageService>,
    /// Assistant completion client
    pub completion_service: Arc<CompletionService>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Result<Self, ChatError> {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let completion_service = Arc::new(CompletionService::new(config.ai.clone())?);
        let chat_service = Arc::new(ChatService::new(pool.clone()));
        let message_service = Arc::new(MessageService::new(
            pool.clone(),
            broadcaster.clone(),
            completion_service.clone(),
            config.ai.bot_user_id.clone(),
        ));

        Ok(Self {
            pool,
            registry,
            broadcaster,
            chat_service,
            message_service,
            completion_service,
        })
    }
}
