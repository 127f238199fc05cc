//! Routes for the problem catalog.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::problem::ProblemWithTags;
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

use services::services::catalog::CatalogService;

#[derive(Debug, Deserialize)]
pub struct ProblemListQuery {
    pub tier_min: Option<i32>,
    pub tier_max: Option<i32>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<ProblemWithTags>>, ApiError> {
    let problem = CatalogService::get_problem(&state.db.pool, problem_id).await?;
    Ok(ResponseJson(ApiResponse::success(problem)))
}

pub async fn list_problems(
    State(state): State<AppState>,
    Query(query): Query<ProblemListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ProblemWithTags>>>, ApiError> {
    let problems = CatalogService::list_problems(
        &state.db.pool,
        query.tier_min,
        query.tier_max,
        query.tag.as_deref(),
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(problems)))
}

pub async fn sync_problem(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(problem_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<ProblemWithTags>>, ApiError> {
    let problem = state.catalog.sync_problem(&state.db.pool, problem_id).await?;
    Ok(ResponseJson(ApiResponse::success(problem)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/problems",
        Router::new()
            .route("/", get(list_problems))
            .route("/{problem_id}", get(get_problem))
            .route("/{problem_id}/sync", post(sync_problem)),
    )
}
