//! Parley Database Crate
//!
//! Persistence layer for the Parley chat relay: connection management,
//! migrations, entities, and repository implementations. The rest of the
//! system reads and writes exclusively through the repositories here and
//! never assumes in-process caching of the stored records.

use sqlx::SqlitePool;

use parley_config::DatabaseConfig;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

// Re-export repositories
pub use repos::{ChatRepository, MessageRepository, ParticipantRepository, UserRepository};

// Re-export entities
pub use entities::{
    chat::{Chat, ChatKind, CreateChatRequest},
    message::{CreateMessageRequest, Message, MessageStatus, MessageWithSender},
    participant::{ChatParticipant, CreateParticipantRequest},
    user::{UpsertUser, User},
};

// Re-export types
pub use types::{StoreError, StoreResult};

/// Prepare the database connection and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> StoreResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    run_migrations(&pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    Ok(pool)
}
