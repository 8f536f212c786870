//! Repository for chat participant data access operations.

use crate::entities::{ChatParticipant, CreateParticipantRequest};
use crate::types::{StoreError, StoreResult};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Repository for chat membership records
#[derive(Clone)]
pub struct ParticipantRepository {
    pool: SqlitePool,
}

impl ParticipantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a user to a chat
    pub async fn add(&self, request: &CreateParticipantRequest) -> StoreResult<ChatParticipant> {
        let id = cuid2::cuid();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO chat_participants (id, chat_id, user_id, is_admin, joined_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.chat_id)
        .bind(&request.user_id)
        .bind(request.is_admin)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(
            chat_id = %request.chat_id,
            user_id = %request.user_id,
            is_admin = request.is_admin,
            "added chat participant"
        );

        self.find_by_id(&id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<ChatParticipant>> {
        let row = sqlx::query(
            "SELECT id, chat_id, user_id, is_admin, joined_at FROM chat_participants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| participant_from_row(&row)).transpose()
    }

    pub async fn list_for_chat(&self, chat_id: &str) -> StoreResult<Vec<ChatParticipant>> {
        let rows = sqlx::query(
            "SELECT id, chat_id, user_id, is_admin, joined_at
             FROM chat_participants WHERE chat_id = ? ORDER BY joined_at",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(participant_from_row).collect()
    }
}

fn participant_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<ChatParticipant> {
    Ok(ChatParticipant {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        user_id: row.try_get("user_id")?,
        is_admin: row.try_get("is_admin")?,
        joined_at: row.try_get("joined_at")?,
    })
}
