//! Repository for chat data access operations.

use crate::entities::{Chat, ChatKind, CreateChatRequest};
use crate::types::{StoreError, StoreResult};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Repository for chat database operations
#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new chat
    pub async fn create(&self, request: &CreateChatRequest) -> StoreResult<Chat> {
        let id = cuid2::cuid();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO chats (id, name, kind, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(request.kind.as_str())
        .bind(&request.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(chat_id = %id, kind = %request.kind, "created chat");

        self.find_by_id(&id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, name, kind, created_by, created_at, updated_at FROM chats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| chat_from_row(&row)).transpose()
    }

    /// All chats the given user participates in, most recently updated first.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT c.id, c.name, c.kind, c.created_by, c.created_at, c.updated_at
             FROM chats c
             INNER JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ?
             ORDER BY c.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chat_from_row).collect()
    }
}

fn chat_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Chat> {
    let kind: String = row.try_get("kind")?;

    Ok(Chat {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: ChatKind::from(kind.as_str()),
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::prepare_database;
    use crate::entities::{CreateParticipantRequest, UpsertUser};
    use crate::migrations::run_migrations;
    use crate::repos::{ParticipantRepository, UserRepository};
    use parley_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn create_test_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_chats.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = prepare_database(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, temp_dir)
    }

    async fn seed_user(pool: &SqlitePool, id: &str) {
        UserRepository::new(pool.clone())
            .upsert(&UpsertUser {
                id: id.to_string(),
                email: None,
                first_name: Some(id.to_string()),
                last_name: None,
                profile_image_url: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let (pool, _temp_dir) = create_test_pool().await;
        seed_user(&pool, "u1").await;
        let repo = ChatRepository::new(pool);

        let chat = repo
            .create(&CreateChatRequest {
                name: Some("friends".to_string()),
                kind: ChatKind::Group,
                created_by: Some("u1".to_string()),
            })
            .await
            .unwrap();

        let found = repo.find_by_id(&chat.id).await.unwrap().unwrap();
        assert_eq!(found, chat);
        assert_eq!(found.kind, ChatKind::Group);
    }

    #[tokio::test]
    async fn list_for_user_only_returns_joined_chats() {
        let (pool, _temp_dir) = create_test_pool().await;
        seed_user(&pool, "u1").await;
        seed_user(&pool, "u2").await;
        let repo = ChatRepository::new(pool.clone());
        let participants = ParticipantRepository::new(pool);

        let joined = repo
            .create(&CreateChatRequest {
                name: None,
                kind: ChatKind::Direct,
                created_by: Some("u1".to_string()),
            })
            .await
            .unwrap();
        // Chat u1 does not participate in.
        repo.create(&CreateChatRequest {
            name: None,
            kind: ChatKind::Direct,
            created_by: Some("u2".to_string()),
        })
        .await
        .unwrap();

        participants
            .add(&CreateParticipantRequest {
                chat_id: joined.id.clone(),
                user_id: "u1".to_string(),
                is_admin: true,
            })
            .await
            .unwrap();

        let chats = repo.list_for_user("u1").await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, joined.id);
    }
}
