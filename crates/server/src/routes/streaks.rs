//! Routes for the per-day activity history.

use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::NaiveDate;
use db::models::date_record::{CurrentStreak, UserDateRecord};
use serde::Deserialize;
use services::services::streak::StreakService;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

pub async fn get_history(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(range): Query<RangeQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<UserDateRecord>>>, ApiError> {
    let days =
        StreakService::history(&state.db.pool, current.user.id, range.from, range.to).await?;
    Ok(ResponseJson(ApiResponse::success(days)))
}

pub async fn get_current(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<CurrentStreak>>, ApiError> {
    let streak = StreakService::current(&state.db.pool, current.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(streak)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/streaks",
        Router::new()
            .route("/", get(get_history))
            .route("/current", get(get_current)),
    )
}
