//! OAuth login and JWT session management.
//!
//! Login is the standard authorization-code flow. The `state` parameter
//! is HMAC-signed rather than stored, so no server state exists before
//! the callback. Sessions are whitelisted in the database and checked on
//! every authenticated request; refresh tokens are stored hashed and
//! rotated on use.

use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

use chrono::Utc;
use db::models::{
    auth_session::AuthSession,
    user::{CreateUser, User},
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use url::Url;
use utils::jwt::{Claims, JwtError, JwtSigner, TokenUse};
use uuid::Uuid;

use super::config::{Config, OAuthProvider};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("http client error: {0}")]
    Client(String),
    #[error("unknown oauth provider: {0}")]
    UnknownProvider(String),
    #[error("invalid oauth state")]
    InvalidState,
    #[error("oauth exchange failed: {0}")]
    Exchange(String),
    #[error("provider identity missing {0}")]
    MalformedIdentity(&'static str),
    #[error("session expired or revoked")]
    SessionInvalid,
    #[error("user not found")]
    UserNotFound,
}

/// Identity details extracted from a provider's userinfo payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderIdentity {
    pub subject: String,
    pub username_hint: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    config: Arc<Config>,
    signer: JwtSigner,
    http: Client,
}

impl AuthService {
    const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);

    pub fn new(config: Arc<Config>) -> Result<Self, AuthError> {
        let signer = JwtSigner::new(
            config.jwt_secret.as_bytes(),
            config.access_ttl(),
            config.refresh_ttl(),
        );
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("solvelog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))?;

        Ok(Self {
            config,
            signer,
            http,
        })
    }

    pub fn provider_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config.oauth_providers.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn provider(&self, key: &str) -> Result<&OAuthProvider, AuthError> {
        self.config
            .oauth_providers
            .get(key)
            .ok_or_else(|| AuthError::UnknownProvider(key.to_string()))
    }

    /// Builds the provider authorization URL with a signed state.
    pub fn authorize_url(&self, provider_key: &str) -> Result<String, AuthError> {
        let provider = self.provider(provider_key)?;
        let state = self.issue_state_at(Utc::now().timestamp())?;

        let mut url =
            Url::parse(&provider.auth_url).map_err(|e| AuthError::Exchange(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri(provider_key))
            .append_pair("response_type", "code")
            .append_pair("scope", &provider.scopes)
            .append_pair("state", &state);
        Ok(url.to_string())
    }

    /// Completes the OAuth callback: checks state, trades the code for an
    /// access token, resolves the identity, and opens a session.
    pub async fn login_with_code(
        &self,
        pool: &SqlitePool,
        provider_key: &str,
        code: &str,
        state: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        self.verify_state_at(state, Utc::now().timestamp())?;
        let provider = self.provider(provider_key)?;

        let provider_token = self.exchange_code(provider, provider_key, code).await?;
        let payload = self.fetch_userinfo(provider, &provider_token).await?;
        let identity = extract_identity(provider_key, &payload)?;

        let user = self.find_or_create_user(pool, provider_key, &identity).await?;
        let tokens = self.issue_session(pool, user.id).await?;

        info!(user_id = %user.id, provider = provider_key, "user logged in");
        Ok((user, tokens))
    }

    async fn exchange_code(
        &self,
        provider: &OAuthProvider,
        provider_key: &str,
        code: &str,
    ) -> Result<String, AuthError> {
        let redirect_uri = self.config.redirect_uri(provider_key);
        let res = self
            .http
            .post(&provider.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", provider.client_id.as_str()),
                ("client_secret", provider.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        if !res.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "token endpoint returned {}",
                res.status()
            )));
        }
        let payload: TokenExchangeResponse = res
            .json()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;
        Ok(payload.access_token)
    }

    async fn fetch_userinfo(
        &self,
        provider: &OAuthProvider,
        provider_token: &str,
    ) -> Result<serde_json::Value, AuthError> {
        let res = self
            .http
            .get(&provider.userinfo_url)
            .bearer_auth(provider_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        if !res.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "userinfo endpoint returned {}",
                res.status()
            )));
        }
        res.json()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))
    }

    async fn find_or_create_user(
        &self,
        pool: &SqlitePool,
        provider_key: &str,
        identity: &ProviderIdentity,
    ) -> Result<User, AuthError> {
        if let Some(user) =
            User::find_by_provider_subject(pool, provider_key, &identity.subject).await?
        {
            return Ok(user);
        }

        let username = unique_username(pool, &identity.username_hint).await?;
        let user = User::create(
            pool,
            &CreateUser {
                username,
                email: identity.email.clone(),
                provider: provider_key.to_string(),
                provider_subject: identity.subject.clone(),
            },
            Uuid::new_v4(),
        )
        .await?;
        info!(user_id = %user.id, provider = provider_key, "registered new user");
        Ok(user)
    }

    /// Opens a session and mints its first token pair.
    pub async fn issue_session(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<TokenPair, AuthError> {
        if let Err(e) = AuthSession::delete_expired(pool).await {
            warn!("failed to prune expired sessions: {e}");
        }

        let session_id = Uuid::new_v4();
        let refresh_token = self.signer.issue_refresh(user_id, session_id)?;
        let expires_at = Utc::now() + self.signer.refresh_ttl();
        AuthSession::create(
            pool,
            session_id,
            user_id,
            &hash_refresh_token(&refresh_token),
            expires_at,
        )
        .await?;

        let access_token = self.signer.issue_access(user_id, session_id)?;
        Ok(self.token_pair(access_token, refresh_token))
    }

    /// Rotates a refresh token. Presenting a stale refresh token revokes
    /// the whole session, since it means the token leaked or was replayed.
    pub async fn refresh(
        &self,
        pool: &SqlitePool,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.signer.verify(refresh_token, TokenUse::Refresh)?;
        let session = AuthSession::find_by_id(pool, claims.sid)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if !session.is_active(Utc::now()) {
            return Err(AuthError::SessionInvalid);
        }

        if !hashes_match(
            &hash_refresh_token(refresh_token),
            &session.refresh_token_hash,
        ) {
            warn!(session_id = %session.id, "stale refresh token presented, revoking session");
            AuthSession::revoke(pool, session.id).await?;
            return Err(AuthError::SessionInvalid);
        }

        let next_refresh = self.signer.issue_refresh(claims.sub, session.id)?;
        let expires_at = Utc::now() + self.signer.refresh_ttl();
        AuthSession::rotate(
            pool,
            session.id,
            &hash_refresh_token(&next_refresh),
            expires_at,
        )
        .await?;

        let access_token = self.signer.issue_access(claims.sub, session.id)?;
        Ok(self.token_pair(access_token, next_refresh))
    }

    pub async fn logout(&self, pool: &SqlitePool, session_id: Uuid) -> Result<(), AuthError> {
        AuthSession::revoke(pool, session_id).await?;
        Ok(())
    }

    pub async fn logout_all(&self, pool: &SqlitePool, user_id: Uuid) -> Result<u64, AuthError> {
        Ok(AuthSession::revoke_all_for_user(pool, user_id).await?)
    }

    /// Validates an access token against the session whitelist and loads
    /// its user. Every authenticated request funnels through here.
    pub async fn authenticate(
        &self,
        pool: &SqlitePool,
        access_token: &str,
    ) -> Result<(User, Claims), AuthError> {
        let claims = self.signer.verify(access_token, TokenUse::Access)?;
        let session = AuthSession::find_by_id(pool, claims.sid)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if !session.is_active(Utc::now()) {
            return Err(AuthError::SessionInvalid);
        }

        let user = User::find_by_id(pool, claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok((user, claims))
    }

    fn token_pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.signer.access_ttl().num_seconds(),
        }
    }

    fn issue_state_at(&self, now_ts: i64) -> Result<String, AuthError> {
        let nonce = hex::encode(rand::random::<[u8; 16]>());
        let message = format!("{nonce}.{now_ts}");
        let mac = state_mac(self.config.jwt_secret.as_bytes(), message.as_bytes())?;
        Ok(format!("{message}.{}", hex::encode(mac)))
    }

    fn verify_state_at(&self, state: &str, now_ts: i64) -> Result<(), AuthError> {
        let mut parts = state.splitn(3, '.');
        let (Some(nonce), Some(ts_raw), Some(mac_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidState);
        };
        let ts: i64 = ts_raw.parse().map_err(|_| AuthError::InvalidState)?;

        let message = format!("{nonce}.{ts}");
        let expected = state_mac(self.config.jwt_secret.as_bytes(), message.as_bytes())?;
        let provided = hex::decode(mac_hex).map_err(|_| AuthError::InvalidState)?;
        if !bool::from(expected.ct_eq(&provided)) {
            return Err(AuthError::InvalidState);
        }

        let age = now_ts - ts;
        if age < 0 || age > self.config.oauth_state_ttl_seconds {
            return Err(AuthError::InvalidState);
        }
        Ok(())
    }
}

fn state_mac(key: &[u8], message: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| AuthError::Client(e.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn hashes_match(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Pulls (subject, username hint, email) out of a provider's userinfo
/// response. GitHub and Google shapes are handled explicitly; anything
/// else falls back to OIDC-style fields.
fn extract_identity(
    provider_key: &str,
    payload: &serde_json::Value,
) -> Result<ProviderIdentity, AuthError> {
    match provider_key {
        "github" => {
            let subject = payload
                .get("id")
                .and_then(|v| v.as_i64())
                .ok_or(AuthError::MalformedIdentity("id"))?
                .to_string();
            let username_hint = payload
                .get("login")
                .and_then(|v| v.as_str())
                .ok_or(AuthError::MalformedIdentity("login"))?
                .to_string();
            let email = payload
                .get("email")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            Ok(ProviderIdentity {
                subject,
                username_hint,
                email,
            })
        }
        _ => {
            let subject = payload
                .get("sub")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| payload.get("id").and_then(|v| v.as_i64()).map(|v| v.to_string()))
                .ok_or(AuthError::MalformedIdentity("sub"))?;
            let email = payload
                .get("email")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let username_hint = payload
                .get("preferred_username")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| {
                    email
                        .as_deref()
                        .and_then(|e| e.split('@').next())
                        .map(str::to_string)
                })
                .or_else(|| {
                    payload
                        .get("name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| "user".to_string());
            Ok(ProviderIdentity {
                subject,
                username_hint,
                email,
            })
        }
    }
}

fn sanitize_username(hint: &str) -> String {
    let cleaned: String = hint
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(24)
        .collect();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

/// First tries the sanitized hint, then a few random suffixes.
async fn unique_username(pool: &SqlitePool, hint: &str) -> Result<String, AuthError> {
    let base = sanitize_username(hint);
    if !User::username_exists(pool, &base).await? {
        return Ok(base);
    }
    for _ in 0..4 {
        let candidate = format!("{base}-{}", hex::encode(rand::random::<[u8; 2]>()));
        if !User::username_exists(pool, &candidate).await? {
            return Ok(candidate);
        }
    }
    Ok(format!("{base}-{}", hex::encode(rand::random::<[u8; 8]>())))
}
