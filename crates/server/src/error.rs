use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    account_link::AccountLinkError, auth::AuthError, catalog::CatalogError, judge_api::JudgeApiError,
    recommendation::RecommendationError, records::RecordsError, streak::StreakError,
};
use thiserror::Error;
use tracing::error;
use utils::{jwt::JwtError, response::ApiResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    AccountLink(#[from] AccountLinkError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Records(#[from] RecordsError),
    #[error(transparent)]
    Streak(#[from] StreakError),
    #[error(transparent)]
    Recommendation(#[from] RecommendationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("missing access token")]
    MissingToken,
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => auth_status(e),
            ApiError::AccountLink(e) => account_link_status(e),
            ApiError::Catalog(e) => catalog_status(e),
            ApiError::Records(e) => records_status(e),
            ApiError::Streak(StreakError::InvalidRange(_)) => StatusCode::BAD_REQUEST,
            ApiError::Streak(StreakError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Recommendation(RecommendationError::InvalidTierRange) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Recommendation(RecommendationError::Database(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn auth_status(e: &AuthError) -> StatusCode {
    match e {
        AuthError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        AuthError::Jwt(JwtError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Jwt(_) | AuthError::InvalidState | AuthError::SessionInvalid => {
            StatusCode::UNAUTHORIZED
        }
        // The user row vanished under a live session; treat as logged out.
        AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
        AuthError::Exchange(_) | AuthError::MalformedIdentity(_) => StatusCode::BAD_GATEWAY,
        AuthError::Client(_) | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn account_link_status(e: &AccountLinkError) -> StatusCode {
    match e {
        AccountLinkError::NotLinked | AccountLinkError::HandleNotFound(_) => StatusCode::NOT_FOUND,
        AccountLinkError::HandleTaken(_) | AccountLinkError::NotVerified => StatusCode::CONFLICT,
        AccountLinkError::CodeNotInBio => StatusCode::BAD_REQUEST,
        AccountLinkError::JudgeApi(e) => judge_api_status(e),
        AccountLinkError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn catalog_status(e: &CatalogError) -> StatusCode {
    match e {
        CatalogError::ProblemNotFound(_) | CatalogError::TagNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InvalidThresholds(_) => StatusCode::BAD_REQUEST,
        CatalogError::JudgeApi(e) => judge_api_status(e),
        CatalogError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn records_status(e: &RecordsError) -> StatusCode {
    match e {
        RecordsError::Duplicate => StatusCode::CONFLICT,
        RecordsError::NotFound => StatusCode::NOT_FOUND,
        RecordsError::Catalog(e) => catalog_status(e),
        RecordsError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn judge_api_status(e: &JudgeApiError) -> StatusCode {
    match e {
        JudgeApiError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        if status.is_server_error() {
            error!("request failed: {message}");
        }
        (status, Json(ApiResponse::<()>::error(&message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_documented_statuses() {
        assert_eq!(
            ApiError::from(AuthError::UnknownProvider("gitlab".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidState).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::Exchange("boom".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(AccountLinkError::HandleTaken("h".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AccountLinkError::JudgeApi(JudgeApiError::Timeout)).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(CatalogError::ProblemNotFound(1)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(RecordsError::Duplicate).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RecordsError::Catalog(CatalogError::ProblemNotFound(1))).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StreakError::InvalidRange("bad")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::MissingToken.status_code(), StatusCode::UNAUTHORIZED);
    }
}
