//! Routes for linking a judge account.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use db::models::judge_account::JudgeAccount;
use serde::{Deserialize, Serialize};
use services::services::account_link::AccountLinkService;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LinkRequest {
    pub handle: String,
}

pub async fn create_link(
    State(state): State<AppState>,
    current: CurrentUser,
    ResponseJson(req): ResponseJson<LinkRequest>,
) -> Result<ResponseJson<ApiResponse<JudgeAccount>>, ApiError> {
    let handle = req.handle.trim();
    if handle.is_empty() {
        return Err(ApiError::BadRequest("handle must not be empty".to_string()));
    }
    let account = state
        .links
        .link(&state.db.pool, current.user.id, handle)
        .await?;
    Ok(ResponseJson(ApiResponse::success(account)))
}

pub async fn verify_link(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<JudgeAccount>>, ApiError> {
    let account = state.links.verify(&state.db.pool, current.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(account)))
}

pub async fn refresh_link(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<JudgeAccount>>, ApiError> {
    let account = state.links.refresh(&state.db.pool, current.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(account)))
}

pub async fn get_link(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<Option<JudgeAccount>>>, ApiError> {
    let account = AccountLinkService::get(&state.db.pool, current.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(account)))
}

pub async fn delete_link(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    AccountLinkService::unlink(&state.db.pool, current.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/account-link",
        Router::new()
            .route("/", post(create_link).get(get_link).delete(delete_link))
            .route("/verify", post(verify_link))
            .route("/refresh", post(refresh_link)),
    )
}
