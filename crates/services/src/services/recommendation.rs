//! Rule-based problem recommendations.
//!
//! Every filter is conjunctive and optional. Tier, accepted-count and
//! already-recorded exclusions run in SQL; tag membership and the
//! mastery gate run over the fetched tag sets.

use std::collections::{HashMap, HashSet};

use db::models::{
    judge_account::{JudgeAccount, LinkStatus},
    problem::{Problem, ProblemWithTags},
    tag_skill::{SkillLevel, TagSkill, UserTagStat},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::catalog;

const MIN_TIER: i32 = 0;
const MAX_TIER: i32 = 30;
const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Rows fetched per page; the tag and mastery filters run after SQL, so
/// pages keep coming until `limit` results survive or the catalog runs
/// out of candidates.
const FETCH_FACTOR: i64 = 10;

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid tier range: tier_min is greater than tier_max")]
    InvalidTierRange,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct RecommendationQuery {
    pub tier_min: Option<i32>,
    pub tier_max: Option<i32>,
    /// Comma-separated tag keys; a candidate must carry at least one.
    pub tags: Option<String>,
    /// Mastery gate: every tag of a candidate must be unlocked at this
    /// level per the user's stats.
    pub skill: Option<SkillLevel>,
    pub min_accepted: Option<i64>,
    pub include_planned: Option<bool>,
    pub limit: Option<i64>,
}

pub struct RecommendationService;

impl RecommendationService {
    pub async fn recommend(
        pool: &SqlitePool,
        user_id: Uuid,
        query: &RecommendationQuery,
    ) -> Result<Vec<ProblemWithTags>, RecommendationError> {
        let (default_min, default_max) = default_tier_window(pool, user_id).await?;
        let tier_min = query.tier_min.unwrap_or(default_min).clamp(MIN_TIER, MAX_TIER);
        let tier_max = query.tier_max.unwrap_or(default_max).clamp(MIN_TIER, MAX_TIER);
        if tier_min > tier_max {
            return Err(RecommendationError::InvalidTierRange);
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let tag_filter = parse_tag_filter(query.tags.as_deref());
        let mastery = match query.skill {
            Some(required) if required > SkillLevel::None => {
                let counts = UserTagStat::counts_for_user(pool, user_id).await?;
                let thresholds: HashMap<String, TagSkill> = TagSkill::find_all(pool)
                    .await?
                    .into_iter()
                    .map(|s| (s.tag_key.clone(), s))
                    .collect();
                Some((required, counts, thresholds))
            }
            _ => None,
        };

        let page_size = limit * FETCH_FACTOR;
        let mut results = Vec::new();
        let mut offset = 0;
        loop {
            let candidates = Problem::list_candidates(
                pool,
                user_id,
                tier_min,
                tier_max,
                query.min_accepted.unwrap_or(0),
                query.include_planned.unwrap_or(false),
                page_size,
                offset,
            )
            .await?;
            let exhausted = (candidates.len() as i64) < page_size;

            let mut with_tags = catalog::attach_tags(pool, candidates).await?;
            if let Some(wanted) = &tag_filter {
                with_tags.retain(|p| p.tags.iter().any(|t| wanted.contains(t.as_str())));
            }
            if let Some((required, counts, thresholds)) = &mastery {
                with_tags.retain(|p| mastery_unlocked(p, *required, counts, thresholds));
            }
            results.append(&mut with_tags);

            if exhausted || results.len() as i64 >= limit {
                break;
            }
            offset += page_size;
        }

        results.truncate(limit as usize);
        Ok(results)
    }
}

/// Verified accounts get a window around their own tier; everyone else
/// gets the full ladder.
async fn default_tier_window(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<(i32, i32), RecommendationError> {
    match JudgeAccount::find_by_user_id(pool, user_id).await? {
        Some(account) if account.status == LinkStatus::Verified => Ok((
            (account.tier - 2).clamp(MIN_TIER, MAX_TIER),
            (account.tier + 3).clamp(MIN_TIER, MAX_TIER),
        )),
        _ => Ok((MIN_TIER, MAX_TIER)),
    }
}

fn parse_tag_filter(raw: Option<&str>) -> Option<HashSet<&str>> {
    let wanted: HashSet<&str> = raw?
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    (!wanted.is_empty()).then_some(wanted)
}

/// True when every tag on the problem is unlocked at `required` level.
/// Untagged problems pass vacuously.
fn mastery_unlocked(
    problem: &ProblemWithTags,
    required: SkillLevel,
    counts: &HashMap<String, i64>,
    thresholds: &HashMap<String, TagSkill>,
) -> bool {
    problem.tags.iter().all(|tag| {
        let Some(skill) = thresholds.get(tag) else {
            return false;
        };
        let solved = counts.get(tag).copied().unwrap_or(0);
        SkillLevel::for_count(solved, skill) >= required
    })
}
