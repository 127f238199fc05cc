//! Per-day activity history and the current-streak computation.

use chrono::{Duration, NaiveDate, Utc};
use db::models::date_record::{CurrentStreak, UserDateRecord};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

/// Longest range a single history query may span.
const MAX_RANGE_DAYS: i64 = 366;

/// More days than any streak the range queries can show.
const RECENT_FETCH_LIMIT: i64 = 400;

#[derive(Debug, Error)]
pub enum StreakError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid date range: {0}")]
    InvalidRange(&'static str),
}

pub struct StreakService;

impl StreakService {
    /// Day rows in the inclusive `[from, to]` range, oldest first.
    pub async fn history(
        pool: &SqlitePool,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<UserDateRecord>, StreakError> {
        if from > to {
            return Err(StreakError::InvalidRange("from is after to"));
        }
        if (to - from).num_days() >= MAX_RANGE_DAYS {
            return Err(StreakError::InvalidRange("range wider than 366 days"));
        }
        Ok(UserDateRecord::find_range(pool, user_id, from, to).await?)
    }

    pub async fn current(pool: &SqlitePool, user_id: Uuid) -> Result<CurrentStreak, StreakError> {
        let rows = UserDateRecord::find_recent(pool, user_id, RECENT_FETCH_LIMIT).await?;
        Ok(compute_streak(&rows, Utc::now().date_naive()))
    }
}

/// Walks day rows (newest first) and counts the run of consecutive
/// active days ending today or yesterday. A day with no solves yet today
/// does not break the streak until the day is over.
fn compute_streak(rows: &[UserDateRecord], today: NaiveDate) -> CurrentStreak {
    let today_count = rows
        .iter()
        .find(|r| r.record_date == today)
        .map(|r| r.solved_count)
        .unwrap_or(0);

    let active: Vec<NaiveDate> = rows
        .iter()
        .filter(|r| r.solved_count > 0)
        .map(|r| r.record_date)
        .collect();

    let Some(&last_active) = active.first() else {
        return CurrentStreak {
            days: 0,
            today_count,
            last_active: None,
        };
    };

    if last_active < today - Duration::days(1) {
        return CurrentStreak {
            days: 0,
            today_count,
            last_active: Some(last_active),
        };
    }

    let mut days = 1;
    for pair in active.windows(2) {
        if pair[0] - pair[1] == Duration::days(1) {
            days += 1;
        } else {
            break;
        }
    }

    CurrentStreak {
        days,
        today_count,
        last_active: Some(last_active),
    }
}
