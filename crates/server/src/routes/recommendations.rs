//! Route for rule-based problem recommendations.

use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::problem::ProblemWithTags;
use services::services::recommendation::{RecommendationQuery, RecommendationService};
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

pub async fn get_recommendations(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<RecommendationQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ProblemWithTags>>>, ApiError> {
    let problems =
        RecommendationService::recommend(&state.db.pool, current.user.id, &query).await?;
    Ok(ResponseJson(ApiResponse::success(problems)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/recommendations", get(get_recommendations))
}
