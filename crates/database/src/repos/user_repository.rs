//! Repository for user data access operations.

use crate::entities::{UpsertUser, User};
use crate::types::{StoreError, StoreResult};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user or refresh an existing record in place.
    pub async fn upsert(&self, request: &UpsertUser) -> StoreResult<User> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, email, first_name, last_name, profile_image_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 profile_image_url = excluded.profile_image_url,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id)
        .bind(&request.email)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.profile_image_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(user_id = %request.id, "upserted user");

        self.find_by_id(&request.id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, profile_image_url, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }
}

pub(crate) fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        profile_image_url: row.try_get("profile_image_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::prepare_database;
    use crate::migrations::run_migrations;
    use parley_config::DatabaseConfig;
    use tempfile::TempDir;

    async fn create_test_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_users.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = prepare_database(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = UserRepository::new(pool);

        let created = repo
            .upsert(&UpsertUser {
                id: "u1".to_string(),
                email: Some("a@example.com".to_string()),
                first_name: Some("Anna".to_string()),
                last_name: None,
                profile_image_url: None,
            })
            .await
            .unwrap();
        assert_eq!(created.email.as_deref(), Some("a@example.com"));

        let updated = repo
            .upsert(&UpsertUser {
                id: "u1".to_string(),
                email: Some("b@example.com".to_string()),
                first_name: Some("Anna".to_string()),
                last_name: Some("B".to_string()),
                profile_image_url: None,
            })
            .await
            .unwrap();
        assert_eq!(updated.email.as_deref(), Some("b@example.com"));
        assert_eq!(updated.last_name.as_deref(), Some("B"));
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn find_by_id_returns_none_for_unknown_user() {
        let (pool, _temp_dir) = create_test_pool().await;
        let repo = UserRepository::new(pool);

        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }
}
