//! Routes for the current user's profile and aggregates.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::{
    date_record::CurrentStreak,
    judge_account::JudgeAccount,
    solve_record::{RecordStatus, SolveRecord},
    tag_skill::UserTagSkill,
    user::User,
};
use serde::{Deserialize, Serialize};
use services::services::{
    account_link::AccountLinkService, catalog::CatalogService, streak::StreakService,
};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

/// Everything the profile page needs in one round trip.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UserOverview {
    pub user: User,
    pub judge_account: Option<JudgeAccount>,
    pub streak: CurrentStreak,
    pub solved_count: i64,
    pub planned_count: i64,
}

pub async fn get_me(current: CurrentUser) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(current.user))
}

pub async fn get_overview(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<UserOverview>>, ApiError> {
    let pool = &state.db.pool;
    let user_id = current.user.id;

    let judge_account = AccountLinkService::get(pool, user_id).await?;
    let streak = StreakService::current(pool, user_id).await?;
    let solved_count = SolveRecord::count_by_user(pool, user_id, Some(RecordStatus::Solved)).await?;
    let planned_count =
        SolveRecord::count_by_user(pool, user_id, Some(RecordStatus::Planned)).await?;

    Ok(ResponseJson(ApiResponse::success(UserOverview {
        user: current.user,
        judge_account,
        streak,
        solved_count,
        planned_count,
    })))
}

pub async fn get_tag_skills(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<Vec<UserTagSkill>>>, ApiError> {
    let skills = CatalogService::user_tag_skills(&state.db.pool, current.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(skills)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/users/me",
        Router::new()
            .route("/", get(get_me))
            .route("/overview", get(get_overview))
            .route("/tag-skills", get(get_tag_skills)),
    )
}
