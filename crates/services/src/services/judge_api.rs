//! Client for the external judge's public API.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://solved.ac/api/v3";

#[derive(Debug, Clone, Error)]
pub enum JudgeApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("not found on judge")]
    NotFound,
    #[error("json error: {0}")]
    Serde(String),
}

impl JudgeApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Public profile of a judge user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeUser {
    pub handle: String,
    #[serde(default)]
    pub bio: Option<String>,
    pub tier: i32,
    pub rating: i32,
    pub solved_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeTagName {
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeTag {
    pub key: String,
    #[serde(default)]
    pub display_names: Vec<JudgeTagName>,
}

impl JudgeTag {
    /// English display name when available, otherwise the first listed
    /// name, otherwise the key itself.
    pub fn display_name(&self) -> String {
        self.display_names
            .iter()
            .find(|n| n.language == "en")
            .or_else(|| self.display_names.first())
            .map(|n| n.name.clone())
            .unwrap_or_else(|| self.key.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeProblem {
    pub problem_id: i64,
    #[serde(rename = "titleKo")]
    pub title: String,
    /// Difficulty tier, 0 (unrated) to 30.
    pub level: i32,
    pub accepted_user_count: i64,
    #[serde(default)]
    pub average_tries: f64,
    #[serde(default)]
    pub tags: Vec<JudgeTag>,
}

/// Seam over the judge API so services and tests can swap in stubs.
#[async_trait]
pub trait JudgeGateway: Send + Sync {
    async fn fetch_user(&self, handle: &str) -> Result<JudgeUser, JudgeApiError>;
    async fn fetch_problem(&self, problem_id: i64) -> Result<JudgeProblem, JudgeApiError>;
}

#[derive(Debug, Clone)]
pub struct JudgeApiClient {
    http: Client,
    base_url: String,
}

impl JudgeApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(base_url: Option<String>) -> Result<Self, JudgeApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("solvelog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JudgeApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, JudgeApiError> {
        (|| async { self.send_request(path, query).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &JudgeApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "judge API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, JudgeApiError> {
        let res = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<T>()
                .await
                .map_err(|e| JudgeApiError::Serde(e.to_string())),
            StatusCode::NOT_FOUND => Err(JudgeApiError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(JudgeApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(JudgeApiError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl JudgeGateway for JudgeApiClient {
    async fn fetch_user(&self, handle: &str) -> Result<JudgeUser, JudgeApiError> {
        self.get_json("/user/show", &[("handle", handle.to_string())])
            .await
    }

    async fn fetch_problem(&self, problem_id: i64) -> Result<JudgeProblem, JudgeApiError> {
        self.get_json("/problem/show", &[("problemId", problem_id.to_string())])
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> JudgeApiError {
    if e.is_timeout() {
        JudgeApiError::Timeout
    } else {
        JudgeApiError::Transport(e.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_payload() {
        let json = r#"{
            "handle": "alice_bj",
            "bio": "solvelog-abcdef12",
            "badgeId": "boj",
            "tier": 14,
            "rating": 1543,
            "solvedCount": 321,
            "voteCount": 9
        }"#;

        let user: JudgeUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.handle, "alice_bj");
        assert_eq!(user.tier, 14);
        assert_eq!(user.solved_count, 321);
        assert_eq!(user.bio.as_deref(), Some("solvelog-abcdef12"));
    }

    #[test]
    fn parses_problem_payload_with_tags() {
        let json = r#"{
            "problemId": 1463,
            "titleKo": "1로 만들기",
            "isSolvable": true,
            "acceptedUserCount": 60000,
            "level": 8,
            "averageTries": 2.9,
            "tags": [
                {
                    "key": "dp",
                    "displayNames": [
                        {"language": "ko", "name": "다이나믹 프로그래밍"},
                        {"language": "en", "name": "dynamic programming"}
                    ]
                }
            ]
        }"#;

        let problem: JudgeProblem = serde_json::from_str(json).unwrap();
        assert_eq!(problem.problem_id, 1463);
        assert_eq!(problem.level, 8);
        assert_eq!(problem.tags.len(), 1);
        assert_eq!(problem.tags[0].display_name(), "dynamic programming");
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "problemId": 1000,
            "titleKo": "A+B",
            "acceptedUserCount": 200000,
            "level": 1
        }"#;

        let problem: JudgeProblem = serde_json::from_str(json).unwrap();
        assert!(problem.tags.is_empty());
        assert_eq!(problem.average_tries, 0.0);
    }

    #[test]
    fn display_name_falls_back_to_key() {
        let tag = JudgeTag {
            key: "geometry".to_string(),
            display_names: vec![],
        };
        assert_eq!(tag.display_name(), "geometry");
    }

    #[test]
    fn retryable_errors() {
        assert!(JudgeApiError::Timeout.should_retry());
        assert!(JudgeApiError::RateLimited.should_retry());
        assert!(
            JudgeApiError::Http {
                status: 503,
                body: String::new()
            }
            .should_retry()
        );
        assert!(
            !JudgeApiError::Http {
                status: 400,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!JudgeApiError::NotFound.should_retry());
        assert!(!JudgeApiError::Serde("bad".to_string()).should_retry());
    }
}
