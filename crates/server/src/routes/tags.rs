//! Routes for tags and their mastery thresholds.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::tag_skill::{TagSkill, TagWithSkill};
use serde::{Deserialize, Serialize};
use services::services::catalog::CatalogService;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateTagSkillRequest {
    pub intermediate: i64,
    pub advanced: i64,
    pub master: i64,
}

pub async fn list_tags(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<TagWithSkill>>>, ApiError> {
    let tags = CatalogService::list_tags(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(tags)))
}

pub async fn update_tag_skill(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(tag_key): Path<String>,
    ResponseJson(req): ResponseJson<UpdateTagSkillRequest>,
) -> Result<ResponseJson<ApiResponse<TagSkill>>, ApiError> {
    let skill = CatalogService::update_thresholds(
        &state.db.pool,
        &tag_key,
        req.intermediate,
        req.advanced,
        req.master,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(skill)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/tags",
        Router::new()
            .route("/", get(list_tags))
            .route("/{tag_key}/skill", put(update_tag_skill)),
    )
}
