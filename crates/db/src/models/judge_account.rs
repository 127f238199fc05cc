use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "link_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Pending,
    Verified,
}

/// Link between a local user and their handle on the external judge.
/// Profile numbers are cached here and refreshed by the sync poller.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct JudgeAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub handle: String,
    pub status: LinkStatus,
    /// Code the user must place in their judge profile bio to prove
    /// ownership of the handle.
    pub verification_code: String,
    pub tier: i32,
    pub rating: i32,
    pub solved_count: i64,
    pub bio: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ALL_COLUMNS: &str = "id, user_id, handle, status, verification_code, tier, rating, solved_count, bio, synced_at, created_at, updated_at";

impl JudgeAccount {
    /// Creates the user's pending link, replacing any previous link so a
    /// user always has at most one.
    pub async fn create_pending(
        pool: &SqlitePool,
        id: Uuid,
        user_id: Uuid,
        handle: &str,
        verification_code: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, JudgeAccount>(&format!(
            "INSERT INTO judge_accounts (id, user_id, handle, verification_code)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT(user_id) DO UPDATE SET
                 handle = excluded.handle,
                 verification_code = excluded.verification_code,
                 status = 'pending',
                 tier = 0,
                 rating = 0,
                 solved_count = 0,
                 bio = NULL,
                 synced_at = NULL,
                 updated_at = datetime('now', 'subsec')
               RETURNING {ALL_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(handle)
        .bind(verification_code)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, JudgeAccount>(&format!(
            "SELECT {ALL_COLUMNS} FROM judge_accounts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Looks up a verified link for `handle`. Used to guarantee a handle
    /// is verified by at most one user.
    pub async fn find_verified_by_handle(
        pool: &SqlitePool,
        handle: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, JudgeAccount>(&format!(
            "SELECT {ALL_COLUMNS} FROM judge_accounts WHERE handle = $1 AND status = 'verified'"
        ))
        .bind(handle)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_verified(
        pool: &SqlitePool,
        id: Uuid,
        tier: i32,
        rating: i32,
        solved_count: i64,
        bio: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, JudgeAccount>(&format!(
            "UPDATE judge_accounts
               SET status = 'verified', tier = $2, rating = $3, solved_count = $4, bio = $5,
                   synced_at = datetime('now', 'subsec'), updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {ALL_COLUMNS}"
        ))
        .bind(id)
        .bind(tier)
        .bind(rating)
        .bind(solved_count)
        .bind(bio)
        .fetch_one(pool)
        .await
    }

    pub async fn update_profile(
        pool: &SqlitePool,
        id: Uuid,
        tier: i32,
        rating: i32,
        solved_count: i64,
        bio: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, JudgeAccount>(&format!(
            "UPDATE judge_accounts
               SET tier = $2, rating = $3, solved_count = $4, bio = $5,
                   synced_at = datetime('now', 'subsec'), updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {ALL_COLUMNS}"
        ))
        .bind(id)
        .bind(tier)
        .bind(rating)
        .bind(solved_count)
        .bind(bio)
        .fetch_one(pool)
        .await
    }

    /// Verified links whose cached profile is older than the given age,
    /// oldest first. Links never synced sort before everything else.
    pub async fn find_stale_verified(
        pool: &SqlitePool,
        older_than_minutes: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let age_str = format!("-{} minutes", older_than_minutes);
        sqlx::query_as::<_, JudgeAccount>(&format!(
            "SELECT {ALL_COLUMNS}
               FROM judge_accounts
               WHERE status = 'verified'
                 AND (synced_at IS NULL OR datetime(synced_at) < datetime('now', $1))
               ORDER BY synced_at ASC"
        ))
        .bind(age_str)
        .fetch_all(pool)
        .await
    }

    pub async fn delete_by_user_id<'e, E>(executor: E, user_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM judge_accounts WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
