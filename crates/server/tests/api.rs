//! End-to-end tests driving the router over an in-memory database, with
//! the judge API replaced by an in-process stub.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use db::{
    DBService,
    models::user::{CreateUser, User},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::{app, state::AppState};
use services::services::{
    account_link::AccountLinkService,
    auth::AuthService,
    catalog::CatalogService,
    config::{Config, OAuthProvider},
    judge_api::{JudgeApiError, JudgeGateway, JudgeProblem, JudgeTag, JudgeUser},
    records::RecordsService,
};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct StubJudge {
    users: Mutex<HashMap<String, JudgeUser>>,
    problems: Mutex<HashMap<i64, JudgeProblem>>,
}

impl StubJudge {
    fn put_user(&self, handle: &str, bio: Option<&str>, tier: i32, solved_count: i64) {
        self.users.lock().unwrap().insert(
            handle.to_string(),
            JudgeUser {
                handle: handle.to_string(),
                bio: bio.map(str::to_string),
                tier,
                rating: tier * 100,
                solved_count,
            },
        );
    }

    fn put_problem(&self, problem_id: i64, title: &str, level: i32, accepted: i64, tags: &[&str]) {
        self.problems.lock().unwrap().insert(
            problem_id,
            JudgeProblem {
                problem_id,
                title: title.to_string(),
                level,
                accepted_user_count: accepted,
                average_tries: 2.0,
                tags: tags
                    .iter()
                    .map(|key| JudgeTag {
                        key: key.to_string(),
                        display_names: vec![],
                    })
                    .collect(),
            },
        );
    }
}

#[async_trait]
impl JudgeGateway for StubJudge {
    async fn fetch_user(&self, handle: &str) -> Result<JudgeUser, JudgeApiError> {
        self.users
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or(JudgeApiError::NotFound)
    }

    async fn fetch_problem(&self, problem_id: i64) -> Result<JudgeProblem, JudgeApiError> {
        self.problems
            .lock()
            .unwrap()
            .get(&problem_id)
            .cloned()
            .ok_or(JudgeApiError::NotFound)
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        public_base_url: "http://localhost:3000".to_string(),
        jwt_secret: "integration-test-secret".to_string(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 14,
        oauth_state_ttl_seconds: 600,
        judge_api_base_url: None,
        profile_sync_enabled: false,
        profile_sync_interval_minutes: 360,
        oauth_providers: HashMap::from([(
            "github".to_string(),
            OAuthProvider {
                key: "github".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                auth_url: "https://github.com/login/oauth/authorize".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                userinfo_url: "https://api.github.com/user".to_string(),
                scopes: "read:user".to_string(),
            },
        )]),
    }
}

async fn test_state() -> (AppState, Arc<StubJudge>) {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let config = Arc::new(test_config());
    let db = DBService::new_in_memory().await.unwrap();
    let auth = AuthService::new(config.clone()).unwrap();

    let judge = Arc::new(StubJudge::default());
    let gateway: Arc<dyn JudgeGateway> = judge.clone();
    let catalog = CatalogService::new(gateway.clone());

    let state = AppState {
        db,
        config,
        auth,
        links: AccountLinkService::new(gateway),
        records: RecordsService::new(catalog.clone()),
        catalog,
    };
    (state, judge)
}

/// Registers a user directly and opens a session, returning the bearer
/// token the handlers expect.
async fn login(state: &AppState, username: &str) -> (User, String) {
    let user = User::create(
        &state.db.pool,
        &CreateUser {
            username: username.to_string(),
            email: None,
            provider: "github".to_string(),
            provider_subject: format!("gh-{username}"),
        },
        Uuid::new_v4(),
    )
    .await
    .unwrap();

    let tokens = state.auth.issue_session(&state.db.pool, user.id).await.unwrap();
    (user, tokens.access_token)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let response = app(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (state, _) = test_state().await;
    let (status, body) = send(&state, request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ok");
}

#[tokio::test]
async fn providers_lists_configured_oauth() {
    let (state, _) = test_state().await;
    let (status, body) = send(&state, request("GET", "/api/auth/providers", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["github"]));
}

#[tokio::test]
async fn authorize_builds_a_provider_url() {
    let (state, _) = test_state().await;
    let (status, body) = send(
        &state,
        request("GET", "/api/auth/github/authorize", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["data"]["url"].as_str().unwrap();
    assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
    assert!(url.contains("state="));

    let (status, _) = send(
        &state,
        request("GET", "/api/auth/gitlab/authorize", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_routes_reject_missing_and_bogus_tokens() {
    let (state, _) = test_state().await;

    let (status, body) = send(&state, request("GET", "/api/records", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &state,
        request("GET", "/api/users/me", Some("not-a-jwt"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (state, _) = test_state().await;
    let (_, token) = login(&state, "alice").await;

    let (status, _) = send(
        &state,
        request("POST", "/api/auth/logout", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&state, request("GET", "/api/users/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookies_for_the_whole_site() {
    let (state, _) = test_state().await;
    let (_, token) = login(&state, "lena").await;

    // Cookie-based session, the shape a browser client uses.
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header(
            header::COOKIE,
            format!("access_token={token}; refresh_token=unused"),
        )
        .body(Body::empty())
        .unwrap();
    let response = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cleared: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().any(|c| c.starts_with("access_token=")));
    assert!(cleared.iter().any(|c| c.starts_with("refresh_token=")));
    for cookie in cleared {
        // Must match the path the session cookies were set with, or the
        // browser never drops them.
        assert!(cookie.contains("Path=/"), "no Path in {cookie}");
        assert!(cookie.contains("Max-Age=0"), "not expired: {cookie}");
    }
}

#[tokio::test]
async fn refresh_rotates_tokens_via_body() {
    let (state, _) = test_state().await;
    let user = User::create(
        &state.db.pool,
        &CreateUser {
            username: "bob".to_string(),
            email: None,
            provider: "github".to_string(),
            provider_subject: "gh-bob".to_string(),
        },
        Uuid::new_v4(),
    )
    .await
    .unwrap();
    let tokens = state.auth.issue_session(&state.db.pool, user.id).await.unwrap();

    let (status, body) = send(
        &state,
        request(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": tokens.refresh_token })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, tokens.refresh_token);

    // The old refresh token is dead after rotation.
    let (status, _) = send(
        &state,
        request(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": tokens.refresh_token })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn solving_a_problem_updates_streak_and_tag_stats() {
    let (state, judge) = test_state().await;
    let (_, token) = login(&state, "carol").await;
    judge.put_problem(1463, "Make It One", 8, 60000, &["dp"]);

    // Creating a solved record pulls the problem into the catalog.
    let (status, body) = send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "problem_id": 1463, "status": "solved" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["problem"]["title"], "Make It One");
    assert_eq!(
        body["data"]["solved_on"],
        Utc::now().date_naive().to_string()
    );
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &state,
        request("GET", "/api/streaks/current", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["days"], 1);
    assert_eq!(body["data"]["today_count"], 1);

    let (status, body) = send(
        &state,
        request("GET", "/api/users/me/tag-skills", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let skills = body["data"].as_array().unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0]["tag_key"], "dp");
    assert_eq!(skills[0]["solved_count"], 1);

    // One record per (user, problem).
    let (status, _) = send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "problem_id": 1463 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Deleting the solve rolls the bookkeeping back.
    let (status, _) = send(
        &state,
        request(
            "DELETE",
            &format!("/api/records/{record_id}"),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &state,
        request("GET", "/api/streaks/current", Some(&token), None),
    )
    .await;
    assert_eq!(body["data"]["days"], 0);
    assert_eq!(body["data"]["today_count"], 0);
}

#[tokio::test]
async fn planned_records_count_only_once_solved() {
    let (state, judge) = test_state().await;
    let (_, token) = login(&state, "dave").await;
    judge.put_problem(1000, "A+B", 1, 200000, &[]);

    let (status, body) = send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "problem_id": 1000, "note": "warm-up" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "planned");
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(
        &state,
        request("GET", "/api/streaks/current", Some(&token), None),
    )
    .await;
    assert_eq!(body["data"]["days"], 0);

    let (status, body) = send(
        &state,
        request(
            "PATCH",
            &format!("/api/records/{record_id}"),
            Some(&token),
            Some(json!({ "status": "solved" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "solved");

    let (_, body) = send(
        &state,
        request("GET", "/api/streaks/current", Some(&token), None),
    )
    .await;
    assert_eq!(body["data"]["days"], 1);
}

#[tokio::test]
async fn records_are_scoped_to_their_owner() {
    let (state, judge) = test_state().await;
    let (_, alice_token) = login(&state, "alice").await;
    let (_, mallory_token) = login(&state, "mallory").await;
    judge.put_problem(1000, "A+B", 1, 200000, &[]);

    let (_, body) = send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&alice_token),
            Some(json!({ "problem_id": 1000 })),
        ),
    )
    .await;
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &state,
        request(
            "DELETE",
            &format!("/api/records/{record_id}"),
            Some(&mallory_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(
        &state,
        request("GET", "/api/records", Some(&alice_token), None),
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn account_link_handshake() {
    let (state, judge) = test_state().await;
    let (_, token) = login(&state, "erin").await;
    judge.put_user("erin_bj", Some("just a bio"), 14, 321);

    let (status, body) = send(
        &state,
        request(
            "POST",
            "/api/account-link",
            Some(&token),
            Some(json!({ "handle": "erin_bj" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    let code = body["data"]["verification_code"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(code.starts_with("solvelog-"));

    // The bio does not carry the code yet.
    let (status, _) = send(
        &state,
        request("POST", "/api/account-link/verify", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bio = format!("streak grinder | {code}");
    judge.put_user("erin_bj", Some(&bio), 14, 321);
    let (status, body) = send(
        &state,
        request("POST", "/api/account-link/verify", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "verified");
    assert_eq!(body["data"]["tier"], 14);
    assert_eq!(body["data"]["solved_count"], 321);

    // Profile moved on the judge; manual refresh picks it up.
    judge.put_user("erin_bj", Some(&bio), 15, 360);
    let (status, body) = send(
        &state,
        request("POST", "/api/account-link/refresh", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tier"], 15);

    let (status, _) = send(
        &state,
        request("DELETE", "/api/account-link", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &state,
        request("GET", "/api/account-link", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn linking_rejects_blank_and_unknown_handles() {
    let (state, _) = test_state().await;
    let (_, token) = login(&state, "frank").await;

    let (status, _) = send(
        &state,
        request(
            "POST",
            "/api/account-link",
            Some(&token),
            Some(json!({ "handle": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Claiming an unknown handle is allowed; verification is what fails.
    let (status, _) = send(
        &state,
        request(
            "POST",
            "/api/account-link",
            Some(&token),
            Some(json!({ "handle": "ghost" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &state,
        request("POST", "/api/account-link/verify", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn problem_sync_and_catalog_reads() {
    let (state, judge) = test_state().await;
    let (_, token) = login(&state, "grace").await;
    judge.put_problem(1463, "Make It One", 8, 60000, &["dp", "greedy"]);

    // Sync requires auth; catalog reads do not.
    let (status, _) = send(&state, request("POST", "/api/problems/1463/sync", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &state,
        request("POST", "/api/problems/1463/sync", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Make It One");
    assert_eq!(body["data"]["tags"], json!(["dp", "greedy"]));

    let (status, body) = send(&state, request("GET", "/api/problems/1463", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tier"], 8);

    let (status, body) = send(
        &state,
        request("GET", "/api/problems?tier_min=5&tag=dp", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &state,
        request("POST", "/api/problems/99999/sync", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, request("GET", "/api/problems/99999", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tag_thresholds_validate_ordering() {
    let (state, judge) = test_state().await;
    let (_, token) = login(&state, "heidi").await;
    judge.put_problem(1, "P", 5, 10, &["greedy"]);
    send(
        &state,
        request("POST", "/api/problems/1/sync", Some(&token), None),
    )
    .await;

    let (status, body) = send(
        &state,
        request(
            "PUT",
            "/api/tags/greedy/skill",
            Some(&token),
            Some(json!({ "intermediate": 5, "advanced": 20, "master": 50 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["advanced_threshold"], 20);

    let (status, _) = send(
        &state,
        request(
            "PUT",
            "/api/tags/greedy/skill",
            Some(&token),
            Some(json!({ "intermediate": 20, "advanced": 10, "master": 50 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &state,
        request(
            "PUT",
            "/api/tags/missing/skill",
            Some(&token),
            Some(json!({ "intermediate": 5, "advanced": 20, "master": 50 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&state, request("GET", "/api/tags", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["key"], "greedy");
}

#[tokio::test]
async fn streak_history_validates_the_range() {
    let (state, _) = test_state().await;
    let (_, token) = login(&state, "ivan").await;

    let (status, _) = send(
        &state,
        request(
            "GET",
            "/api/streaks?from=2026-08-10&to=2026-08-01",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &state,
        request(
            "GET",
            "/api/streaks?from=2026-08-01&to=2026-08-10",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn recommendations_exclude_recorded_problems() {
    let (state, judge) = test_state().await;
    let (_, token) = login(&state, "judy").await;
    judge.put_problem(1, "One", 5, 900, &["dp"]);
    judge.put_problem(2, "Two", 5, 500, &["greedy"]);
    judge.put_problem(3, "Three", 5, 100, &["dp"]);
    for id in 1..=3 {
        send(
            &state,
            request("POST", &format!("/api/problems/{id}/sync"), Some(&token), None),
        )
        .await;
    }

    send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "problem_id": 1, "status": "solved" })),
        ),
    )
    .await;

    let (status, body) = send(
        &state,
        request("GET", "/api/recommendations", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3]);

    let (status, body) = send(
        &state,
        request("GET", "/api/recommendations?tags=dp", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3]);

    let (status, _) = send(
        &state,
        request(
            "GET",
            "/api/recommendations?tier_min=10&tier_max=5",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overview_aggregates_profile_counters() {
    let (state, judge) = test_state().await;
    let (user, token) = login(&state, "kim").await;
    judge.put_problem(1, "One", 3, 500, &[]);
    judge.put_problem(2, "Two", 4, 500, &[]);

    send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "problem_id": 1, "status": "solved" })),
        ),
    )
    .await;
    send(
        &state,
        request(
            "POST",
            "/api/records",
            Some(&token),
            Some(json!({ "problem_id": 2 })),
        ),
    )
    .await;

    let (status, body) = send(
        &state,
        request("GET", "/api/users/me/overview", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["username"], user.username);
    assert_eq!(body["data"]["judge_account"], Value::Null);
    assert_eq!(body["data"]["solved_count"], 1);
    assert_eq!(body["data"]["planned_count"], 1);
    assert_eq!(body["data"]["streak"]["days"], 1);
}
