use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;

/// Problem metadata cached from the external judge.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Problem {
    /// The judge's numeric problem id.
    pub id: i64,
    pub title: String,
    /// Difficulty tier on the judge's ladder, 0 (unrated) to 30 (Ruby I).
    pub tier: i32,
    pub accepted_user_count: i64,
    pub average_tries: f64,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Tag {
    pub key: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProblemWithTags {
    #[serde(flatten)]
    #[ts(flatten)]
    pub problem: Problem,
    pub tags: Vec<String>,
}

impl std::ops::Deref for ProblemWithTags {
    type Target = Problem;
    fn deref(&self) -> &Self::Target {
        &self.problem
    }
}

impl std::ops::DerefMut for ProblemWithTags {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.problem
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TagSeed {
    pub key: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpsertProblem {
    pub id: i64,
    pub title: String,
    pub tier: i32,
    pub accepted_user_count: i64,
    pub average_tries: f64,
    pub tags: Vec<TagSeed>,
}

/// Human name for a tier on the judge's ladder.
pub fn tier_name(tier: i32) -> String {
    if tier <= 0 {
        return "Unrated".to_string();
    }
    let groups = ["Bronze", "Silver", "Gold", "Platinum", "Diamond", "Ruby"];
    let group = ((tier - 1) / 5) as usize;
    if group >= groups.len() {
        return "Master".to_string();
    }
    let rank = ["V", "IV", "III", "II", "I"][((tier - 1) % 5) as usize];
    format!("{} {}", groups[group], rank)
}

const PROBLEM_COLUMNS: &str =
    "id, title, tier, accepted_user_count, average_tries, synced_at, created_at, updated_at";

impl Problem {
    /// Inserts or refreshes a problem row and replaces its tag links.
    /// New tags get a `tags` row and a default `tag_skills` row.
    pub async fn upsert(pool: &SqlitePool, data: &UpsertProblem) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let problem = sqlx::query_as::<_, Problem>(&format!(
            "INSERT INTO problems (id, title, tier, accepted_user_count, average_tries, synced_at)
               VALUES ($1, $2, $3, $4, $5, datetime('now', 'subsec'))
               ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 tier = excluded.tier,
                 accepted_user_count = excluded.accepted_user_count,
                 average_tries = excluded.average_tries,
                 synced_at = excluded.synced_at,
                 updated_at = datetime('now', 'subsec')
               RETURNING {PROBLEM_COLUMNS}"
        ))
        .bind(data.id)
        .bind(&data.title)
        .bind(data.tier)
        .bind(data.accepted_user_count)
        .bind(data.average_tries)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM problem_tags WHERE problem_id = $1")
            .bind(data.id)
            .execute(&mut *tx)
            .await?;

        for tag in &data.tags {
            sqlx::query("INSERT INTO tags (key, display_name) VALUES ($1, $2) ON CONFLICT(key) DO NOTHING")
                .bind(&tag.key)
                .bind(&tag.display_name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO tag_skills (tag_key) VALUES ($1) ON CONFLICT(tag_key) DO NOTHING")
                .bind(&tag.key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO problem_tags (problem_id, tag_key) VALUES ($1, $2)")
                .bind(data.id)
                .bind(&tag.key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(problem)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Problem>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_with_tags(
        pool: &SqlitePool,
        id: i64,
    ) -> Result<Option<ProblemWithTags>, sqlx::Error> {
        let Some(problem) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let tags = Self::tags_for(pool, id).await?;
        Ok(Some(ProblemWithTags { problem, tags }))
    }

    pub async fn tags_for<'e, E>(executor: E, problem_id: i64) -> Result<Vec<String>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT tag_key FROM problem_tags WHERE problem_id = $1 ORDER BY tag_key ASC",
        )
        .bind(problem_id)
        .fetch_all(executor)
        .await
    }

    /// Fetches a batch of problems keyed by id.
    pub async fn find_by_ids(
        pool: &SqlitePool,
        ids: &[i64],
    ) -> Result<HashMap<i64, Self>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id IN ({placeholders})");

        let mut query = sqlx::query_as::<_, Problem>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }

    /// Tag keys for a batch of problems in one query.
    pub async fn tags_for_problems(
        pool: &SqlitePool,
        problem_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<String>>, sqlx::Error> {
        if problem_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = (1..=problem_ids.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT problem_id, tag_key FROM problem_tags
               WHERE problem_id IN ({placeholders})
               ORDER BY tag_key ASC"
        );

        let mut query = sqlx::query_as::<_, (i64, String)>(&sql);
        for id in problem_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(pool).await?;

        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        for (problem_id, tag_key) in rows {
            map.entry(problem_id).or_default().push(tag_key);
        }
        Ok(map)
    }

    pub async fn list(
        pool: &SqlitePool,
        tier_min: Option<i32>,
        tier_max: Option<i32>,
        tag: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Problem>(&format!(
            "SELECT {PROBLEM_COLUMNS}
               FROM problems
               WHERE ($1 IS NULL OR tier >= $1)
                 AND ($2 IS NULL OR tier <= $2)
                 AND ($3 IS NULL OR EXISTS (
                       SELECT 1 FROM problem_tags pt
                       WHERE pt.problem_id = problems.id AND pt.tag_key = $3))
               ORDER BY tier ASC, accepted_user_count DESC, id ASC
               LIMIT $4 OFFSET $5"
        ))
        .bind(tier_min)
        .bind(tier_max)
        .bind(tag)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Problems inside a tier window the user has no solve record for.
    /// With `include_planned`, problems the user merely planned stay
    /// eligible; solved problems never come back.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_candidates(
        pool: &SqlitePool,
        user_id: uuid::Uuid,
        tier_min: i32,
        tier_max: i32,
        min_accepted: i64,
        include_planned: bool,
        fetch_limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Problem>(&format!(
            "SELECT {PROBLEM_COLUMNS}
               FROM problems
               WHERE tier BETWEEN $2 AND $3
                 AND accepted_user_count >= $4
                 AND NOT EXISTS (
                       SELECT 1 FROM solve_records sr
                       WHERE sr.user_id = $1
                         AND sr.problem_id = problems.id
                         AND (sr.status = 'solved' OR $5 = 0))
               ORDER BY tier ASC, accepted_user_count DESC, id ASC
               LIMIT $6 OFFSET $7"
        ))
        .bind(user_id)
        .bind(tier_min)
        .bind(tier_max)
        .bind(min_accepted)
        .bind(include_planned)
        .bind(fetch_limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}

impl Tag {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tag>("SELECT key, display_name, created_at FROM tags ORDER BY key ASC")
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_key(pool: &SqlitePool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Tag>("SELECT key, display_name, created_at FROM tags WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;
    use uuid::Uuid;

    fn sample(id: i64, tier: i32, accepted: i64, tags: &[(&str, &str)]) -> UpsertProblem {
        UpsertProblem {
            id,
            title: format!("Problem {id}"),
            tier,
            accepted_user_count: accepted,
            average_tries: 2.5,
            tags: tags
                .iter()
                .map(|(key, name)| TagSeed {
                    key: key.to_string(),
                    display_name: name.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let db = DBService::new_in_memory().await.unwrap();

        let first = Problem::upsert(&db.pool, &sample(1000, 8, 5000, &[("dp", "Dynamic Programming")]))
            .await
            .unwrap();
        assert_eq!(first.tier, 8);

        let second = Problem::upsert(
            &db.pool,
            &sample(1000, 9, 6000, &[("greedy", "Greedy"), ("math", "Mathematics")]),
        )
        .await
        .unwrap();
        assert_eq!(second.id, 1000);
        assert_eq!(second.tier, 9);
        assert_eq!(second.accepted_user_count, 6000);

        let tags = Problem::tags_for(&db.pool, 1000).await.unwrap();
        assert_eq!(tags, vec!["greedy".to_string(), "math".to_string()]);
    }

    #[tokio::test]
    async fn upsert_seeds_tag_and_skill_rows() {
        let db = DBService::new_in_memory().await.unwrap();

        Problem::upsert(&db.pool, &sample(2000, 12, 100, &[("graphs", "Graph Theory")]))
            .await
            .unwrap();

        let tags = Tag::find_all(&db.pool).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].display_name, "Graph Theory");

        let thresholds = sqlx::query_scalar::<_, i64>(
            "SELECT intermediate_threshold FROM tag_skills WHERE tag_key = 'graphs'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(thresholds, 10);
    }

    #[tokio::test]
    async fn list_filters_by_tier_and_tag() {
        let db = DBService::new_in_memory().await.unwrap();

        Problem::upsert(&db.pool, &sample(1, 3, 10, &[("dp", "DP")])).await.unwrap();
        Problem::upsert(&db.pool, &sample(2, 10, 10, &[("dp", "DP")])).await.unwrap();
        Problem::upsert(&db.pool, &sample(3, 10, 10, &[("greedy", "Greedy")]))
            .await
            .unwrap();

        let mid = Problem::list(&db.pool, Some(5), Some(15), None, 50, 0)
            .await
            .unwrap();
        assert_eq!(mid.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);

        let dp = Problem::list(&db.pool, None, None, Some("dp"), 50, 0)
            .await
            .unwrap();
        assert_eq!(dp.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn candidates_respect_solve_records() {
        let db = DBService::new_in_memory().await.unwrap();
        let user_id = Uuid::new_v4();

        sqlx::query("INSERT INTO users (id, username, provider, provider_subject) VALUES ($1, 'u', 'github', 's')")
            .bind(user_id)
            .execute(&db.pool)
            .await
            .unwrap();

        for id in [1, 2, 3] {
            Problem::upsert(&db.pool, &sample(id, 10, 100, &[])).await.unwrap();
        }
        sqlx::query(
            "INSERT INTO solve_records (id, user_id, problem_id, status) VALUES ($1, $2, 1, 'solved')",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO solve_records (id, user_id, problem_id, status) VALUES ($1, $2, 2, 'planned')",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&db.pool)
        .await
        .unwrap();

        let strict = Problem::list_candidates(&db.pool, user_id, 0, 30, 0, false, 10, 0)
            .await
            .unwrap();
        assert_eq!(strict.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);

        let with_planned = Problem::list_candidates(&db.pool, user_id, 0, 30, 0, true, 10, 0)
            .await
            .unwrap();
        assert_eq!(
            with_planned.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let second_page = Problem::list_candidates(&db.pool, user_id, 0, 30, 0, true, 1, 1)
            .await
            .unwrap();
        assert_eq!(second_page.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn tier_names_follow_the_ladder() {
        assert_eq!(tier_name(0), "Unrated");
        assert_eq!(tier_name(1), "Bronze V");
        assert_eq!(tier_name(10), "Silver I");
        assert_eq!(tier_name(11), "Gold V");
        assert_eq!(tier_name(30), "Ruby I");
        assert_eq!(tier_name(31), "Master");
    }
}
