//! Routes for OAuth login and session management.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use db::models::user::User;
use serde::{Deserialize, Serialize};
use services::services::auth::TokenPair;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{
    error::ApiError,
    middleware::{ACCESS_COOKIE, CurrentUser, REFRESH_COOKIE},
    state::AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AuthorizeResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LoginResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

pub async fn list_providers(
    State(state): State<AppState>,
) -> ResponseJson<ApiResponse<Vec<String>>> {
    ResponseJson(ApiResponse::success(state.auth.provider_keys()))
}

pub async fn authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<ResponseJson<ApiResponse<AuthorizeResponse>>, ApiError> {
    let url = state.auth.authorize_url(&provider)?;
    Ok(ResponseJson(ApiResponse::success(AuthorizeResponse { url })))
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, ResponseJson<ApiResponse<LoginResponse>>), ApiError> {
    let (user, tokens) = state
        .auth
        .login_with_code(&state.db.pool, &provider, &params.code, &params.state)
        .await?;

    let jar = with_session_cookies(jar, &tokens);
    Ok((
        jar,
        ResponseJson(ApiResponse::success(LoginResponse { user, tokens })),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<ResponseJson<RefreshRequest>>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<TokenPair>>), ApiError> {
    let token = body
        .and_then(|ResponseJson(req)| req.refresh_token)
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or(ApiError::MissingToken)?;

    let tokens = state.auth.refresh(&state.db.pool, &token).await?;
    let jar = with_session_cookies(jar, &tokens);
    Ok((jar, ResponseJson(ApiResponse::success(tokens))))
}

pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, ResponseJson<ApiResponse<()>>), ApiError> {
    state
        .auth
        .logout(&state.db.pool, current.claims.sid)
        .await?;

    // Removal cookies must carry the same path as the originals, or the
    // browser scopes them to /api/auth and keeps the Path=/ cookies.
    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    Ok((jar, ResponseJson(ApiResponse::success(()))))
}

fn with_session_cookies(jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
}

/// HttpOnly cookie; expiry is enforced by the JWT itself and the session
/// whitelist, not the cookie lifetime.
fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Lax);
    cookie
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/providers", get(list_providers))
            .route("/{provider}/authorize", get(authorize))
            .route("/{provider}/callback", get(callback))
            .route("/refresh", post(refresh))
            .route("/logout", post(logout)),
    )
}
