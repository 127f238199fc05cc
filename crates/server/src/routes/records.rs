//! Routes for solve records.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{patch, post},
};
use db::models::solve_record::{
    CreateSolveRecord, RecordStatus, SolveRecordWithProblem, UpdateSolveRecord,
};
use serde::Deserialize;
use services::services::records::RecordsService;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, middleware::CurrentUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RecordListQuery {
    pub status: Option<RecordStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_record(
    State(state): State<AppState>,
    current: CurrentUser,
    ResponseJson(req): ResponseJson<CreateSolveRecord>,
) -> Result<ResponseJson<ApiResponse<SolveRecordWithProblem>>, ApiError> {
    let record = state
        .records
        .create(&state.db.pool, current.user.id, &req)
        .await?;
    Ok(ResponseJson(ApiResponse::success(record)))
}

pub async fn list_records(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<RecordListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<SolveRecordWithProblem>>>, ApiError> {
    let records = RecordsService::list(
        &state.db.pool,
        current.user.id,
        query.status,
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(records)))
}

pub async fn update_record(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(record_id): Path<Uuid>,
    ResponseJson(req): ResponseJson<UpdateSolveRecord>,
) -> Result<ResponseJson<ApiResponse<SolveRecordWithProblem>>, ApiError> {
    let record =
        RecordsService::update(&state.db.pool, current.user.id, record_id, &req).await?;
    Ok(ResponseJson(ApiResponse::success(record)))
}

pub async fn delete_record(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(record_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    RecordsService::delete(&state.db.pool, current.user.id, record_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/records",
        Router::new()
            .route("/", post(create_record).get(list_records))
            .route("/{record_id}", patch(update_record).delete(delete_record)),
    )
}
