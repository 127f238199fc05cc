//! Problem and tag catalog, cached from the judge and queried locally.

use std::{collections::HashMap, sync::Arc};

use db::models::{
    problem::{Problem, ProblemWithTags, Tag, TagSeed, UpsertProblem},
    tag_skill::{SkillLevel, TagSkill, TagWithSkill, UserTagSkill, UserTagStat},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::judge_api::{JudgeApiError, JudgeGateway, JudgeProblem};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("judge api error: {0}")]
    JudgeApi(#[from] JudgeApiError),
    #[error("problem {0} not found")]
    ProblemNotFound(i64),
    #[error("tag {0} not found")]
    TagNotFound(String),
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(&'static str),
}

#[derive(Clone)]
pub struct CatalogService {
    gateway: Arc<dyn JudgeGateway>,
}

impl CatalogService {
    pub fn new(gateway: Arc<dyn JudgeGateway>) -> Self {
        Self { gateway }
    }

    /// Fetches a problem from the judge and upserts it with its tags.
    pub async fn sync_problem(
        &self,
        pool: &SqlitePool,
        problem_id: i64,
    ) -> Result<ProblemWithTags, CatalogError> {
        let fetched = self
            .gateway
            .fetch_problem(problem_id)
            .await
            .map_err(|e| match e {
                JudgeApiError::NotFound => CatalogError::ProblemNotFound(problem_id),
                other => CatalogError::JudgeApi(other),
            })?;

        let problem = Problem::upsert(pool, &to_upsert(&fetched)).await?;
        let tags = Problem::tags_for(pool, problem.id).await?;
        info!(problem_id, tier = problem.tier, "synced problem from judge");
        Ok(ProblemWithTags { problem, tags })
    }

    /// Returns the cached problem, fetching it from the judge only when
    /// the catalog has never seen it.
    pub async fn ensure_problem(
        &self,
        pool: &SqlitePool,
        problem_id: i64,
    ) -> Result<Problem, CatalogError> {
        if let Some(problem) = Problem::find_by_id(pool, problem_id).await? {
            return Ok(problem);
        }
        Ok(self.sync_problem(pool, problem_id).await?.problem)
    }

    pub async fn get_problem(
        pool: &SqlitePool,
        problem_id: i64,
    ) -> Result<ProblemWithTags, CatalogError> {
        Problem::find_with_tags(pool, problem_id)
            .await?
            .ok_or(CatalogError::ProblemNotFound(problem_id))
    }

    pub async fn list_problems(
        pool: &SqlitePool,
        tier_min: Option<i32>,
        tier_max: Option<i32>,
        tag: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProblemWithTags>, CatalogError> {
        let problems = Problem::list(
            pool,
            tier_min,
            tier_max,
            tag,
            limit.clamp(1, 100),
            offset.max(0),
        )
        .await?;
        Ok(attach_tags(pool, problems).await?)
    }

    pub async fn list_tags(pool: &SqlitePool) -> Result<Vec<TagWithSkill>, CatalogError> {
        Ok(TagWithSkill::find_all(pool).await?)
    }

    /// Replaces a tag's mastery thresholds. Values must be positive and
    /// strictly increasing.
    pub async fn update_thresholds(
        pool: &SqlitePool,
        tag_key: &str,
        intermediate: i64,
        advanced: i64,
        master: i64,
    ) -> Result<TagSkill, CatalogError> {
        if intermediate <= 0 {
            return Err(CatalogError::InvalidThresholds(
                "thresholds must be positive",
            ));
        }
        if intermediate >= advanced || advanced >= master {
            return Err(CatalogError::InvalidThresholds(
                "thresholds must be strictly increasing",
            ));
        }

        TagSkill::update_thresholds(pool, tag_key, intermediate, advanced, master)
            .await?
            .ok_or_else(|| CatalogError::TagNotFound(tag_key.to_string()))
    }

    /// Mastery overview for every tag the user has touched.
    pub async fn user_tag_skills(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<UserTagSkill>, CatalogError> {
        let stats = UserTagStat::find_by_user(pool, user_id).await?;
        if stats.is_empty() {
            return Ok(Vec::new());
        }

        let skills: HashMap<String, TagSkill> = TagSkill::find_all(pool)
            .await?
            .into_iter()
            .map(|s| (s.tag_key.clone(), s))
            .collect();
        let names: HashMap<String, String> = Tag::find_all(pool)
            .await?
            .into_iter()
            .map(|t| (t.key, t.display_name))
            .collect();

        Ok(stats
            .into_iter()
            .filter_map(|stat| {
                let skill = skills.get(&stat.tag_key)?;
                Some(UserTagSkill {
                    display_name: names
                        .get(&stat.tag_key)
                        .cloned()
                        .unwrap_or_else(|| stat.tag_key.clone()),
                    level: SkillLevel::for_count(stat.solved_count, skill),
                    next_threshold: skill.next_threshold(stat.solved_count),
                    solved_count: stat.solved_count,
                    tag_key: stat.tag_key,
                })
            })
            .collect())
    }
}

pub(crate) async fn attach_tags(
    pool: &SqlitePool,
    problems: Vec<Problem>,
) -> Result<Vec<ProblemWithTags>, sqlx::Error> {
    let ids: Vec<i64> = problems.iter().map(|p| p.id).collect();
    let mut tag_map = Problem::tags_for_problems(pool, &ids).await?;
    Ok(problems
        .into_iter()
        .map(|problem| {
            let tags = tag_map.remove(&problem.id).unwrap_or_default();
            ProblemWithTags { problem, tags }
        })
        .collect())
}

fn to_upsert(fetched: &JudgeProblem) -> UpsertProblem {
    UpsertProblem {
        id: fetched.problem_id,
        title: fetched.title.clone(),
        tier: fetched.level,
        accepted_user_count: fetched.accepted_user_count,
        average_tries: fetched.average_tries,
        tags: fetched
            .tags
            .iter()
            .map(|tag| TagSeed {
                key: tag.key.clone(),
                display_name: tag.display_name(),
            })
            .collect(),
    }
}
