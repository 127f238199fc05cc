use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Per-day solved counter for one user. Rows stay behind at zero when all
/// solves for a day are undone, so a day once touched remains queryable.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UserDateRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub record_date: NaiveDate,
    pub solved_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Streak summary as of a reference day.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CurrentStreak {
    /// Consecutive active days ending today or yesterday.
    pub days: i64,
    pub today_count: i64,
    pub last_active: Option<NaiveDate>,
}

impl UserDateRecord {
    /// Adds `delta` to the day's solved count, clamping at zero.
    pub async fn apply_delta<'e, E>(
        executor: E,
        user_id: Uuid,
        record_date: NaiveDate,
        delta: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, UserDateRecord>(
            "INSERT INTO user_date_records (id, user_id, record_date, solved_count)
               VALUES ($1, $2, $3, MAX(0, $4))
               ON CONFLICT(user_id, record_date) DO UPDATE SET
                 solved_count = MAX(0, user_date_records.solved_count + $4),
                 updated_at = datetime('now', 'subsec')
               RETURNING id, user_id, record_date, solved_count, created_at, updated_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(record_date)
        .bind(delta)
        .fetch_one(executor)
        .await
    }

    /// Days in `[from, to]` with a record, oldest first. Dates are TEXT
    /// `YYYY-MM-DD` so string comparison orders correctly.
    pub async fn find_range(
        pool: &SqlitePool,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserDateRecord>(
            "SELECT id, user_id, record_date, solved_count, created_at, updated_at
               FROM user_date_records
               WHERE user_id = $1 AND record_date >= $2 AND record_date <= $3
               ORDER BY record_date ASC",
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Most recent days first, for streak computation.
    pub async fn find_recent(
        pool: &SqlitePool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserDateRecord>(
            "SELECT id, user_id, record_date, solved_count, created_at, updated_at
               FROM user_date_records
               WHERE user_id = $1
               ORDER BY record_date DESC
               LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    async fn seed_user(db: &DBService) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, provider, provider_subject) VALUES ($1, 'u', 'github', 's')")
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();
        id
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    #[tokio::test]
    async fn delta_creates_then_accumulates() {
        let db = DBService::new_in_memory().await.unwrap();
        let user_id = seed_user(&db).await;

        let rec = UserDateRecord::apply_delta(&db.pool, user_id, day(20), 1)
            .await
            .unwrap();
        assert_eq!(rec.solved_count, 1);

        let rec = UserDateRecord::apply_delta(&db.pool, user_id, day(20), 1)
            .await
            .unwrap();
        assert_eq!(rec.solved_count, 2);

        let rec = UserDateRecord::apply_delta(&db.pool, user_id, day(20), -5)
            .await
            .unwrap();
        assert_eq!(rec.solved_count, 0);
    }

    #[tokio::test]
    async fn range_bounds_are_inclusive() {
        let db = DBService::new_in_memory().await.unwrap();
        let user_id = seed_user(&db).await;

        for d in [10, 12, 15] {
            UserDateRecord::apply_delta(&db.pool, user_id, day(d), 1)
                .await
                .unwrap();
        }

        let rows = UserDateRecord::find_range(&db.pool, user_id, day(10), day(12))
            .await
            .unwrap();
        assert_eq!(
            rows.iter().map(|r| r.record_date).collect::<Vec<_>>(),
            vec![day(10), day(12)]
        );
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let db = DBService::new_in_memory().await.unwrap();
        let user_id = seed_user(&db).await;

        for d in [10, 11, 12] {
            UserDateRecord::apply_delta(&db.pool, user_id, day(d), 1)
                .await
                .unwrap();
        }

        let rows = UserDateRecord::find_recent(&db.pool, user_id, 2).await.unwrap();
        assert_eq!(
            rows.iter().map(|r| r.record_date).collect::<Vec<_>>(),
            vec![day(12), day(11)]
        );
    }
}
