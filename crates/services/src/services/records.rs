//! Solve records and the bookkeeping that keeps day counts and per-tag
//! stats consistent with them.

use chrono::{NaiveDate, Utc};
use db::models::{
    date_record::UserDateRecord,
    problem::Problem,
    solve_record::{
        CreateSolveRecord, RecordStatus, SolveRecord, SolveRecordWithProblem, UpdateSolveRecord,
    },
    tag_skill::UserTagStat,
};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::catalog::{CatalogError, CatalogService};

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("a record for this problem already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
}

#[derive(Clone)]
pub struct RecordsService {
    catalog: CatalogService,
}

impl RecordsService {
    pub fn new(catalog: CatalogService) -> Self {
        Self { catalog }
    }

    /// Creates a record, pulling the problem into the catalog first when
    /// it has never been seen. Solved records default `solved_on` to
    /// today (UTC) and bump the day and tag counters.
    pub async fn create(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
        data: &CreateSolveRecord,
    ) -> Result<SolveRecordWithProblem, RecordsError> {
        if SolveRecord::find_by_user_and_problem(pool, user_id, data.problem_id)
            .await?
            .is_some()
        {
            return Err(RecordsError::Duplicate);
        }

        let problem = self.catalog.ensure_problem(pool, data.problem_id).await?;

        let status = data.status.unwrap_or_default();
        let solved_on = match status {
            RecordStatus::Solved => Some(data.solved_on.unwrap_or_else(today_utc)),
            RecordStatus::Planned => None,
        };

        // The record and its counters commit together or not at all.
        let mut tx = pool.begin().await?;
        let record = SolveRecord::create(
            &mut *tx,
            user_id,
            Uuid::new_v4(),
            data.problem_id,
            status,
            solved_on,
            data.note.as_deref(),
        )
        .await
        .map_err(map_unique_violation)?;

        if let Some(day) = record.solved_on {
            apply_solve_deltas(&mut tx, user_id, record.problem_id, day, 1).await?;
        }
        tx.commit().await?;

        info!(user_id = %user_id, problem_id = record.problem_id, status = %record.status, "created solve record");
        Ok(SolveRecordWithProblem { record, problem })
    }

    /// The user's records, newest first, each with its problem.
    pub async fn list(
        pool: &SqlitePool,
        user_id: Uuid,
        status: Option<RecordStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SolveRecordWithProblem>, RecordsError> {
        let records =
            SolveRecord::list_by_user(pool, user_id, status, limit.clamp(1, 100), offset.max(0))
                .await?;

        let ids: Vec<i64> = records.iter().map(|r| r.problem_id).collect();
        let mut problems = Problem::find_by_ids(pool, &ids).await?;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let problem = problems.remove(&record.problem_id)?;
                Some(SolveRecordWithProblem { record, problem })
            })
            .collect())
    }

    /// Updates the note and, for planned records, performs the
    /// planned-to-solved transition. Marking a solved record solved again
    /// is a no-op so counters are never double-bumped.
    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        record_id: Uuid,
        data: &UpdateSolveRecord,
    ) -> Result<SolveRecordWithProblem, RecordsError> {
        let mut record = find_owned(pool, user_id, record_id).await?;

        if data.status == Some(RecordStatus::Solved) && record.status == RecordStatus::Planned {
            let day = data.solved_on.unwrap_or_else(today_utc);
            let mut tx = pool.begin().await?;
            record = SolveRecord::mark_solved(&mut *tx, record.id, day).await?;
            apply_solve_deltas(&mut tx, user_id, record.problem_id, day, 1).await?;
            tx.commit().await?;
            info!(user_id = %user_id, problem_id = record.problem_id, %day, "record marked solved");
        }

        if data.note.is_some() {
            record = SolveRecord::update_note(pool, record.id, data.note.as_deref()).await?;
        }

        let problem = Problem::find_by_id(pool, record.problem_id)
            .await?
            .ok_or(RecordsError::NotFound)?;
        Ok(SolveRecordWithProblem { record, problem })
    }

    /// Deletes a record. A solved record gives back its day and tag
    /// counts, floored at zero.
    pub async fn delete(
        pool: &SqlitePool,
        user_id: Uuid,
        record_id: Uuid,
    ) -> Result<(), RecordsError> {
        let record = find_owned(pool, user_id, record_id).await?;

        let mut tx = pool.begin().await?;
        SolveRecord::delete(&mut *tx, record.id).await?;
        if let Some(day) = record.solved_on.filter(|_| record.status == RecordStatus::Solved) {
            apply_solve_deltas(&mut tx, user_id, record.problem_id, day, -1).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn find_owned(
    pool: &SqlitePool,
    user_id: Uuid,
    record_id: Uuid,
) -> Result<SolveRecord, RecordsError> {
    SolveRecord::find_by_id(pool, record_id)
        .await?
        .filter(|r| r.user_id == user_id)
        .ok_or(RecordsError::NotFound)
}

/// Applies one solve (or un-solve) to the per-day counter and every tag
/// counter of the problem, on the caller's transaction.
async fn apply_solve_deltas(
    tx: &mut SqliteConnection,
    user_id: Uuid,
    problem_id: i64,
    day: NaiveDate,
    delta: i64,
) -> Result<(), sqlx::Error> {
    UserDateRecord::apply_delta(&mut *tx, user_id, day, delta).await?;
    for tag_key in Problem::tags_for(&mut *tx, problem_id).await? {
        UserTagStat::apply_delta(&mut *tx, user_id, &tag_key, delta).await?;
    }
    Ok(())
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

fn map_unique_violation(e: sqlx::Error) -> RecordsError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => RecordsError::Duplicate,
        _ => RecordsError::Database(e),
    }
}
