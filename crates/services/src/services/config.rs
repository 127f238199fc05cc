//! Process configuration, read once from the environment at startup.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::Duration;
use thiserror::Error;
use tracing::info;

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USERINFO_URL: &str = "https://api.github.com/user";
const GITHUB_SCOPES: &str = "read:user user:email";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// One configured OAuth identity provider.
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub key: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// External base URL, used to build OAuth redirect URIs.
    pub public_base_url: String,
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub oauth_state_ttl_seconds: i64,
    /// Override for the judge API base URL; `None` uses the public API.
    pub judge_api_base_url: Option<String>,
    pub profile_sync_enabled: bool,
    pub profile_sync_interval_minutes: u64,
    pub oauth_providers: HashMap<String, OAuthProvider>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "127.0.0.1");
        let port: u16 = parse_env_or("PORT", 3000)?;
        let database_url = env_or("DATABASE_URL", "sqlite://solvelog.db");
        let public_base_url = env_or("PUBLIC_BASE_URL", format!("http://{host}:{port}"));

        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET"))?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::MissingVar("JWT_SECRET"));
        }

        let mut oauth_providers = HashMap::new();
        if let Some(provider) = load_provider(
            "github",
            "GITHUB_CLIENT_ID",
            "GITHUB_CLIENT_SECRET",
            GITHUB_AUTH_URL,
            GITHUB_TOKEN_URL,
            GITHUB_USERINFO_URL,
            GITHUB_SCOPES,
        ) {
            oauth_providers.insert(provider.key.clone(), provider);
        }
        if let Some(provider) = load_provider(
            "google",
            "GOOGLE_CLIENT_ID",
            "GOOGLE_CLIENT_SECRET",
            GOOGLE_AUTH_URL,
            GOOGLE_TOKEN_URL,
            GOOGLE_USERINFO_URL,
            GOOGLE_SCOPES,
        ) {
            oauth_providers.insert(provider.key.clone(), provider);
        }

        Ok(Self {
            host,
            port,
            database_url,
            public_base_url,
            jwt_secret,
            access_ttl_minutes: parse_env_or("ACCESS_TOKEN_TTL_MINUTES", 15)?,
            refresh_ttl_days: parse_env_or("REFRESH_TOKEN_TTL_DAYS", 14)?,
            oauth_state_ttl_seconds: parse_env_or("OAUTH_STATE_TTL_SECONDS", 600)?,
            judge_api_base_url: env_opt("JUDGE_API_BASE_URL"),
            profile_sync_enabled: parse_bool_env("PROFILE_SYNC_ENABLED", true)?,
            profile_sync_interval_minutes: parse_env_or("PROFILE_SYNC_INTERVAL_MINUTES", 360)?,
            oauth_providers,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.refresh_ttl_days)
    }

    pub fn redirect_uri(&self, provider_key: &str) -> String {
        format!(
            "{}/api/auth/{}/callback",
            self.public_base_url.trim_end_matches('/'),
            provider_key
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn load_provider(
    key: &str,
    id_var: &'static str,
    secret_var: &'static str,
    auth_url: &str,
    token_url: &str,
    userinfo_url: &str,
    scopes: &str,
) -> Option<OAuthProvider> {
    let client_id = env_opt(id_var)?;
    let Some(client_secret) = env_opt(secret_var) else {
        info!("{id_var} set but {secret_var} missing, skipping {key} oauth");
        return None;
    };

    Some(OAuthProvider {
        key: key.to_string(),
        client_id,
        client_secret,
        auth_url: auth_url.to_string(),
        token_url: token_url.to_string(),
        userinfo_url: userinfo_url.to_string(),
        scopes: scopes.to_string(),
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: impl Into<String>) -> String {
    env_opt(key).unwrap_or_else(|| default.into())
}

fn parse_env_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env_opt(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool_env(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key) {
        Some(raw) => parse_bool_str(&raw).ok_or(ConfigError::Invalid {
            key,
            message: format!("expected true/false, got {raw:?}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool_str(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_strings_parse_leniently() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str("1"), Some(true));
        assert_eq!(parse_bool_str("ON"), Some(true));
        assert_eq!(parse_bool_str("false"), Some(false));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn redirect_uri_strips_trailing_slash() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: "sqlite::memory:".to_string(),
            public_base_url: "https://solvelog.example/".to_string(),
            jwt_secret: "secret".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 14,
            oauth_state_ttl_seconds: 600,
            judge_api_base_url: None,
            profile_sync_enabled: true,
            profile_sync_interval_minutes: 360,
            oauth_providers: HashMap::new(),
        };
        assert_eq!(
            config.redirect_uri("github"),
            "https://solvelog.example/api/auth/github/callback"
        );
    }
}
