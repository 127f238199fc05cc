//! Request authentication.

use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    headers::{Authorization, authorization::Bearer},
};
use db::models::user::User;
use utils::jwt::Claims;

use crate::{error::ApiError, state::AppState};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Extractor for authenticated endpoints. Accepts the access token from
/// the `Authorization: Bearer` header or the access cookie, then checks
/// it against the session whitelist.
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .extract::<Option<TypedHeader<Authorization<Bearer>>>>()
            .await
            .ok()
            .flatten()
            .map(|TypedHeader(auth)| auth.token().to_string());

        let token = match bearer {
            Some(token) => token,
            None => CookieJar::from_headers(&parts.headers)
                .get(ACCESS_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or(ApiError::MissingToken)?,
        };

        let (user, claims) = state.auth.authenticate(&state.db.pool, &token).await?;
        Ok(CurrentUser { user, claims })
    }
}
