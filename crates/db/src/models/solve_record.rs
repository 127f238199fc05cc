use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::problem::Problem;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "record_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Planned,
    Solved,
}

/// A user's relationship to one problem: planned to solve, or solved on a
/// given day. At most one record per (user, problem).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SolveRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub problem_id: i64,
    pub status: RecordStatus,
    pub solved_on: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SolveRecordWithProblem {
    #[serde(flatten)]
    #[ts(flatten)]
    pub record: SolveRecord,
    pub problem: Problem,
}

impl std::ops::Deref for SolveRecordWithProblem {
    type Target = SolveRecord;
    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateSolveRecord {
    pub problem_id: i64,
    pub status: Option<RecordStatus>,
    /// Day the problem was solved. Only meaningful with `Solved`;
    /// defaults to today (UTC) when omitted.
    pub solved_on: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateSolveRecord {
    pub status: Option<RecordStatus>,
    pub solved_on: Option<NaiveDate>,
    pub note: Option<String>,
}

const RECORD_COLUMNS: &str =
    "id, user_id, problem_id, status, solved_on, note, created_at, updated_at";

impl SolveRecord {
    #[allow(clippy::too_many_arguments)]
    pub async fn create<'e, E>(
        executor: E,
        user_id: Uuid,
        record_id: Uuid,
        problem_id: i64,
        status: RecordStatus,
        solved_on: Option<NaiveDate>,
        note: Option<&str>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SolveRecord>(&format!(
            "INSERT INTO solve_records (id, user_id, problem_id, status, solved_on, note)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {RECORD_COLUMNS}"
        ))
        .bind(record_id)
        .bind(user_id)
        .bind(problem_id)
        .bind(status)
        .bind(solved_on)
        .bind(note)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SolveRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM solve_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_user_and_problem(
        pool: &SqlitePool,
        user_id: Uuid,
        problem_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SolveRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM solve_records WHERE user_id = $1 AND problem_id = $2"
        ))
        .bind(user_id)
        .bind(problem_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_user(
        pool: &SqlitePool,
        user_id: Uuid,
        status: Option<RecordStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SolveRecord>(&format!(
            "SELECT {RECORD_COLUMNS}
               FROM solve_records
               WHERE user_id = $1
                 AND ($2 IS NULL OR status = $2)
               ORDER BY updated_at DESC, created_at DESC
               LIMIT $3 OFFSET $4"
        ))
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_solved<'e, E>(
        executor: E,
        id: Uuid,
        solved_on: NaiveDate,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SolveRecord>(&format!(
            "UPDATE solve_records
               SET status = 'solved', solved_on = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id)
        .bind(solved_on)
        .fetch_one(executor)
        .await
    }

    pub async fn update_note(
        pool: &SqlitePool,
        id: Uuid,
        note: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SolveRecord>(&format!(
            "UPDATE solve_records
               SET note = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id)
        .bind(note)
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_user(
        pool: &SqlitePool,
        user_id: Uuid,
        status: Option<RecordStatus>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM solve_records WHERE user_id = $1 AND ($2 IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(pool)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM solve_records WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
