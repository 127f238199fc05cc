use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Mastery level a user has reached on a tag, derived from solved counts
/// against the tag's thresholds. Never stored, always computed.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    TS,
    EnumString,
    Display,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SkillLevel {
    #[default]
    None,
    Intermediate,
    Advanced,
    Master,
}

/// Per-tag mastery thresholds. One row per tag, seeded with defaults when
/// the tag first appears.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct TagSkill {
    pub tag_key: String,
    pub intermediate_threshold: i64,
    pub advanced_threshold: i64,
    pub master_threshold: i64,
    pub updated_at: DateTime<Utc>,
}

/// Tag joined with its thresholds, the shape returned by tag listings.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct TagWithSkill {
    pub key: String,
    pub display_name: String,
    pub intermediate_threshold: i64,
    pub advanced_threshold: i64,
    pub master_threshold: i64,
}

/// A user's solved count per tag, maintained incrementally as solve
/// records change.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UserTagStat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tag_key: String,
    pub solved_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a user's mastery overview.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UserTagSkill {
    pub tag_key: String,
    pub display_name: String,
    pub solved_count: i64,
    pub level: SkillLevel,
    /// Solved count needed for the next level, if one remains.
    pub next_threshold: Option<i64>,
}

impl SkillLevel {
    pub fn for_count(solved_count: i64, skill: &TagSkill) -> Self {
        if solved_count >= skill.master_threshold {
            SkillLevel::Master
        } else if solved_count >= skill.advanced_threshold {
            SkillLevel::Advanced
        } else if solved_count >= skill.intermediate_threshold {
            SkillLevel::Intermediate
        } else {
            SkillLevel::None
        }
    }
}

impl TagSkill {
    /// Solved count required to hold `level` on this tag.
    pub fn min_solved_for(&self, level: SkillLevel) -> i64 {
        match level {
            SkillLevel::None => 0,
            SkillLevel::Intermediate => self.intermediate_threshold,
            SkillLevel::Advanced => self.advanced_threshold,
            SkillLevel::Master => self.master_threshold,
        }
    }

    /// The nearest threshold `solved_count` has not reached yet.
    pub fn next_threshold(&self, solved_count: i64) -> Option<i64> {
        [
            self.intermediate_threshold,
            self.advanced_threshold,
            self.master_threshold,
        ]
        .into_iter()
        .find(|t| solved_count < *t)
    }

    pub async fn find_by_key(pool: &SqlitePool, tag_key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TagSkill>(
            "SELECT tag_key, intermediate_threshold, advanced_threshold, master_threshold, updated_at
               FROM tag_skills
               WHERE tag_key = $1",
        )
        .bind(tag_key)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TagSkill>(
            "SELECT tag_key, intermediate_threshold, advanced_threshold, master_threshold, updated_at
               FROM tag_skills
               ORDER BY tag_key ASC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update_thresholds(
        pool: &SqlitePool,
        tag_key: &str,
        intermediate: i64,
        advanced: i64,
        master: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TagSkill>(
            "UPDATE tag_skills
               SET intermediate_threshold = $2, advanced_threshold = $3, master_threshold = $4,
                   updated_at = datetime('now', 'subsec')
               WHERE tag_key = $1
               RETURNING tag_key, intermediate_threshold, advanced_threshold, master_threshold, updated_at",
        )
        .bind(tag_key)
        .bind(intermediate)
        .bind(advanced)
        .bind(master)
        .fetch_optional(pool)
        .await
    }
}

impl TagWithSkill {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TagWithSkill>(
            "SELECT t.key, t.display_name, s.intermediate_threshold, s.advanced_threshold, s.master_threshold
               FROM tags t
               JOIN tag_skills s ON s.tag_key = t.key
               ORDER BY t.key ASC",
        )
        .fetch_all(pool)
        .await
    }
}

impl UserTagStat {
    /// Adds `delta` to the user's solved count on a tag, clamping at zero.
    pub async fn apply_delta<'e, E>(
        executor: E,
        user_id: Uuid,
        tag_key: &str,
        delta: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, UserTagStat>(
            "INSERT INTO user_tag_stats (id, user_id, tag_key, solved_count)
               VALUES ($1, $2, $3, MAX(0, $4))
               ON CONFLICT(user_id, tag_key) DO UPDATE SET
                 solved_count = MAX(0, user_tag_stats.solved_count + $4),
                 updated_at = datetime('now', 'subsec')
               RETURNING id, user_id, tag_key, solved_count, created_at, updated_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(tag_key)
        .bind(delta)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserTagStat>(
            "SELECT id, user_id, tag_key, solved_count, created_at, updated_at
               FROM user_tag_stats
               WHERE user_id = $1
               ORDER BY solved_count DESC, tag_key ASC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Solved counts keyed by tag, for mastery checks.
    pub async fn counts_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<HashMap<String, i64>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT tag_key, solved_count FROM user_tag_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
