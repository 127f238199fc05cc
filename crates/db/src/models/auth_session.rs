use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Server-side record of an issued session. A JWT is only honored while
/// its `sid` claim matches a live row here, so logout and revocation take
/// effect immediately.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex digest of the current refresh token.
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }

    pub async fn create(
        pool: &SqlitePool,
        session_id: Uuid,
        user_id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AuthSession>(
            "INSERT INTO auth_sessions (id, user_id, refresh_token_hash, expires_at)
               VALUES ($1, $2, $3, $4)
               RETURNING id, user_id, refresh_token_hash, expires_at, revoked, created_at, updated_at",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(refresh_token_hash)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuthSession>(
            "SELECT id, user_id, refresh_token_hash, expires_at, revoked, created_at, updated_at
               FROM auth_sessions
               WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Rotates the refresh token and slides the session expiry forward.
    pub async fn rotate(
        pool: &SqlitePool,
        id: Uuid,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AuthSession>(
            "UPDATE auth_sessions
               SET refresh_token_hash = $2, expires_at = $3, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, user_id, refresh_token_hash, expires_at, revoked, created_at, updated_at",
        )
        .bind(id)
        .bind(refresh_token_hash)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    pub async fn revoke(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked = 1, updated_at = datetime('now', 'subsec') WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn revoke_all_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked = 1, updated_at = datetime('now', 'subsec')
               WHERE user_id = $1 AND revoked = 0",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Drops sessions past their expiry. Revoked rows are kept until they
    /// expire so reuse of a revoked session id stays observable.
    pub async fn delete_expired(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE datetime(expires_at) < datetime('now')")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
