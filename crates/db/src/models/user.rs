use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    /// OAuth provider key, e.g. "github".
    pub provider: String,
    /// Stable subject id issued by the provider.
    pub provider_subject: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateUser {
    pub username: String,
    pub email: Option<String>,
    pub provider: String,
    pub provider_subject: String,
}

impl User {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, email, provider, provider_subject, created_at, updated_at
               FROM users
               WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_provider_subject(
        pool: &SqlitePool,
        provider: &str,
        provider_subject: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, email, provider, provider_subject, created_at, updated_at
               FROM users
               WHERE provider = $1 AND provider_subject = $2",
        )
        .bind(provider)
        .bind(provider_subject)
        .fetch_optional(pool)
        .await
    }

    pub async fn username_exists(pool: &SqlitePool, username: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateUser,
        user_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, username, email, provider, provider_subject)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, username, email, provider, provider_subject, created_at, updated_at",
        )
        .bind(user_id)
        .bind(&data.username)
        .bind(&data.email)
        .bind(&data.provider)
        .bind(&data.provider_subject)
        .fetch_one(pool)
        .await
    }
}
