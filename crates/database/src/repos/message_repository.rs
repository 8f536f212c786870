//! Repository for message data access operations.

use crate::entities::{
    CreateMessageRequest, Message, MessageStatus, MessageWithSender, User,
};
use crate::types::{StoreError, StoreResult};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

const SELECT_WITH_SENDER: &str = "SELECT m.id, m.chat_id, m.sender_id, m.content, m.is_from_ai, m.status, \
            m.created_at, m.updated_at, \
            u.id AS sender_user_id, u.email AS sender_email, u.first_name AS sender_first_name, \
            u.last_name AS sender_last_name, u.profile_image_url AS sender_profile_image_url, \
            u.created_at AS sender_created_at, u.updated_at AS sender_updated_at \
     FROM messages m INNER JOIN users u ON u.id = m.sender_id";

/// Repository for message database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new message
    pub async fn create(&self, request: &CreateMessageRequest) -> StoreResult<Message> {
        let id = cuid2::cuid();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, content, is_from_ai, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.chat_id)
        .bind(&request.sender_id)
        .bind(&request.content)
        .bind(request.is_from_ai)
        .bind(MessageStatus::Sent.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(
            message_id = %id,
            chat_id = %request.chat_id,
            sender_id = %request.sender_id,
            is_from_ai = request.is_from_ai,
            "created message"
        );

        Ok(Message {
            id,
            chat_id: request.chat_id.clone(),
            sender_id: request.sender_id.clone(),
            content: request.content.clone(),
            is_from_ai: request.is_from_ai,
            status: MessageStatus::Sent,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Fetch a message together with its hydrated sender.
    pub async fn find_with_sender(&self, id: &str) -> StoreResult<Option<MessageWithSender>> {
        let query = format!("{SELECT_WITH_SENDER} WHERE m.id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| message_with_sender_from_row(&row)).transpose()
    }

    /// The `limit` most recent messages of a chat, returned oldest first,
    /// each with its hydrated sender.
    pub async fn recent_with_sender(
        &self,
        chat_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<MessageWithSender>> {
        let query =
            format!("{SELECT_WITH_SENDER} WHERE m.chat_id = ? ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?");
        let rows = sqlx::query(&query)
            .bind(chat_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut messages = rows
            .iter()
            .map(message_with_sender_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Most recent message of a chat, if any.
    pub async fn last_for_chat(&self, chat_id: &str) -> StoreResult<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, chat_id, sender_id, content, is_from_ai, status, created_at, updated_at
             FROM messages WHERE chat_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| message_from_row(&row)).transpose()
    }

    /// Advance the delivery status of a message.
    ///
    /// Transitions only ever progress sent → delivered → read; an update to
    /// an earlier or equal status is ignored and the stored row returned
    /// unchanged.
    pub async fn update_status(&self, id: &str, status: MessageStatus) -> StoreResult<Message> {
        let current = self.find_by_id(id).await?;
        let Some(current) = current else {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        };

        if status.rank() <= current.status.rank() {
            debug!(
                message_id = %id,
                current = %current.status,
                requested = %status,
                "ignoring non-advancing status update"
            );
            return Ok(current);
        }

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE messages SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Message {
            status,
            updated_at: now,
            ..current
        })
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, chat_id, sender_id, content, is_from_ai, status, created_at, updated_at
             FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| message_from_row(&row)).transpose()
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Message> {
    let status: String = row.try_get("status")?;

    Ok(Message {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        sender_id: row.try_get("sender_id")?,
        content: row.try_get("content")?,
        is_from_ai: row.try_get("is_from_ai")?,
        status: MessageStatus::from(status.as_str()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_with_sender_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<MessageWithSender> {
    let message = message_from_row(row)?;
    let sender = User {
        id: row.try_get("sender_user_id")?,
        email: row.try_get("sender_email")?,
        first_name: row.try_get("sender_first_name")?,
        last_name: row.try_get("sender_last_name")?,
        profile_image_url: row.try_get("sender_profile_image_url")?,
        created_at: row.try_get("sender_created_at")?,
        updated_at: row.try_get("sender_updated_at")?,
    };

    Ok(MessageWithSender { message, sender })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::prepare_database;
    use crate::entities::{ChatKind, CreateChatRequest, UpsertUser};
    use crate::migrations::run_migrations;
    use crate::repos::{ChatRepository, UserRepository};
    use parley_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn create_test_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_messages.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = prepare_database(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, temp_dir)
    }

    async fn seed_chat(pool: &SqlitePool, user_id: &str) -> String {
        UserRepository::new(pool.clone())
            .upsert(&UpsertUser {
                id: user_id.to_string(),
                email: None,
                first_name: Some("Anna".to_string()),
                last_name: None,
                profile_image_url: None,
            })
            .await
            .unwrap();

        ChatRepository::new(pool.clone())
            .create(&CreateChatRequest {
                name: None,
                kind: ChatKind::Direct,
                created_by: Some(user_id.to_string()),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_then_fetch_hydrates_sender() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chat_id = seed_chat(&pool, "u1").await;
        let repo = MessageRepository::new(pool);

        let message = repo
            .create(&CreateMessageRequest {
                chat_id,
                sender_id: "u1".to_string(),
                content: "hello".to_string(),
                is_from_ai: false,
            })
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);

        let hydrated = repo.find_with_sender(&message.id).await.unwrap().unwrap();
        assert_eq!(hydrated.message.content, "hello");
        assert_eq!(hydrated.sender.id, "u1");
        assert_eq!(hydrated.sender.first_name.as_deref(), Some("Anna"));
    }

    #[tokio::test]
    async fn recent_with_sender_returns_latest_in_ascending_order() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chat_id = seed_chat(&pool, "u1").await;
        let repo = MessageRepository::new(pool);

        for i in 0..4 {
            repo.create(&CreateMessageRequest {
                chat_id: chat_id.clone(),
                sender_id: "u1".to_string(),
                content: format!("m{i}"),
                is_from_ai: false,
            })
            .await
            .unwrap();
        }

        let recent = repo.recent_with_sender(&chat_id, 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn update_status_never_regresses() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chat_id = seed_chat(&pool, "u1").await;
        let repo = MessageRepository::new(pool);

        let message = repo
            .create(&CreateMessageRequest {
                chat_id,
                sender_id: "u1".to_string(),
                content: "hi".to_string(),
                is_from_ai: false,
            })
            .await
            .unwrap();

        let read = repo
            .update_status(&message.id, MessageStatus::Read)
            .await
            .unwrap();
        assert_eq!(read.status, MessageStatus::Read);

        // Regressing to delivered is ignored.
        let still_read = repo
            .update_status(&message.id, MessageStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(still_read.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn last_for_chat_tracks_newest_message() {
        let (pool, _temp_dir) = create_test_pool().await;
        let chat_id = seed_chat(&pool, "u1").await;
        let repo = MessageRepository::new(pool);

        assert!(repo.last_for_chat(&chat_id).await.unwrap().is_none());

        for content in ["first", "second"] {
            repo.create(&CreateMessageRequest {
                chat_id: chat_id.clone(),
                sender_id: "u1".to_string(),
                content: content.to_string(),
                is_from_ai: false,
            })
            .await
            .unwrap();
        }

        let last = repo.last_for_chat(&chat_id).await.unwrap().unwrap();
        assert_eq!(last.content, "second");
    }
}
