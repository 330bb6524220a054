//! End-to-end integration tests for the EchoPod API
//!
//! These tests drive the real router in-process (no network) over an
//! in-memory store, walking the same flows the frontend uses: CAPTCHA ->
//! register -> login, seeded course browsing, learner progress, and the
//! admin user-management surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use echopod_server::{create_router, AppState, Config};
use echopod_store::{seed, Store};
use tower::util::ServiceExt;

const SAMPLE_SRT: &str = "\
1
00:00:01,000 --> 00:00:03,500
Good morning, everyone.

2
00:00:04,000 --> 00:00:07,250
How was your weekend?
";

/// Builds an app over an in-memory store seeded with the default admin and
/// sample courses.
fn seeded_state() -> Arc<AppState> {
    let upload_dir = tempfile::tempdir().expect("temp dir");
    let config = Config {
        upload_dir: upload_dir.into_path().to_string_lossy().into_owned(),
        ..Config::default()
    };
    let store = Store::open_in_memory().expect("open store");

    let admin_hash = echopod_server::hash_password("password").expect("hash");
    seed(&store, &admin_hash, Some(SAMPLE_SRT), Utc::now()).expect("seed");

    Arc::new(AppState::new(config, store).expect("app state"))
}

/// Sends one JSON request and decodes the response body.
async fn send(
    router: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

async fn send_to(
    state: &Arc<AppState>,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    send(create_router(Arc::clone(state)), method, uri, token, body).await
}

/// Logs in as the seeded admin and returns the token.
async fn admin_token(state: &Arc<AppState>) -> String {
    let (status, body) = send_to(
        state,
        Method::POST,
        "/login",
        None,
        Some(serde_json::json!({"username": "default_user", "password": "password"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "admin login failed: {body}");
    assert_eq!(body["is_admin"], true);
    body["token"].as_str().expect("token").to_string()
}

/// Registers a fresh account through the CAPTCHA flow and returns its token.
async fn register_and_login(state: &Arc<AppState>, username: &str) -> String {
    let issued = state.captcha.issue(Utc::now());
    let (status, body) = send_to(
        state,
        Method::POST,
        "/register",
        None,
        Some(serde_json::json!({
            "username": username,
            "password": "hunter22",
            "captcha_id": issued.id,
            "captcha_text": issued.answer,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    let (status, body) = send_to(
        state,
        Method::POST,
        "/login",
        None,
        Some(serde_json::json!({"username": username, "password": "hunter22"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn test_seeded_admin_can_log_in() {
    let state = seeded_state();
    let token = admin_token(&state).await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn test_register_login_hearts_defaults() {
    let state = seeded_state();
    let token = register_and_login(&state, "fresh_learner").await;

    let (status, body) = send_to(
        &state,
        Method::GET,
        "/api/user/hearts",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_hearts"], 5);
    assert_eq!(body["total_hearts"], 5);
    assert_eq!(body["is_newbie"], true);
    assert_eq!(body["newbie_protection_count"], 3);
    assert_eq!(body["consecutive_correct"], 0);
}

#[tokio::test]
async fn test_seeded_courses_and_sentences() {
    let state = seeded_state();

    let (status, listing) = send_to(&state, Method::GET, "/api/courses/all", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let listing = listing.as_array().expect("array");
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0]["title"], "Basic English Listening");
    assert_eq!(listing[0]["difficulty"], "easy");
    assert_eq!(listing[0]["completed"], false);

    let course_id = listing[0]["id"].as_i64().expect("id");
    let (status, sentences) = send_to(
        &state,
        Method::GET,
        &format!("/api/courses/{course_id}/sentences"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sentences = sentences.as_array().expect("array");
    assert_eq!(sentences.len(), 2);
    assert_eq!(sentences[0]["text"], "Good morning, everyone.");
    assert_eq!(sentences[1]["text"], "How was your weekend?");
}

#[tokio::test]
async fn test_progress_flow_end_to_end() {
    let state = seeded_state();
    let token = register_and_login(&state, "learner").await;

    let (_, listing) = send_to(&state, Method::GET, "/api/courses/all", None, None).await;
    let course_id = listing[0]["id"].as_i64().expect("id");

    // Complete two levels, then the course.
    for level in [0, 1] {
        let (status, _) = send_to(
            &state,
            Method::POST,
            &format!("/api/courses/{course_id}/levels/{level}/complete"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, levels) = send_to(
        &state,
        Method::GET,
        &format!("/api/courses/{course_id}/levels/completed"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(levels, serde_json::json!([0, 1]));

    let (status, _) = send_to(
        &state,
        Method::POST,
        &format!("/api/courses/{course_id}/complete"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The listing now reflects the completion for this user only.
    let (_, listing) = send_to(
        &state,
        Method::GET,
        "/api/courses/all",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(listing[0]["completed"], true);
    assert_eq!(listing[1]["completed"], false);

    let (_, progress) = send_to(
        &state,
        Method::GET,
        "/api/users/progress",
        Some(&token),
        None,
    )
    .await;
    let progress = progress.as_array().expect("array");
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0]["course_title"], "Basic English Listening");
}

#[tokio::test]
async fn test_admin_promotes_and_deletes_user() {
    let state = seeded_state();
    let admin = admin_token(&state).await;
    register_and_login(&state, "upgrade_me").await;

    // Find the new user's id through the listing.
    let (_, users) = send_to(&state, Method::GET, "/api/users", Some(&admin), None).await;
    let user = users
        .as_array()
        .expect("array")
        .iter()
        .find(|u| u["username"] == "upgrade_me")
        .expect("registered user")
        .clone();
    let user_id = user["id"].as_i64().expect("id");

    // Promote to VIP.
    let (status, _) = send_to(
        &state,
        Method::PUT,
        &format!("/api/users/{user_id}"),
        Some(&admin),
        Some(serde_json::json!({"is_vip": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The promotion is visible after a fresh login.
    let (_, body) = send_to(
        &state,
        Method::POST,
        "/login",
        None,
        Some(serde_json::json!({"username": "upgrade_me", "password": "hunter22"})),
    )
    .await;
    assert_eq!(body["is_vip"], true);

    // Delete the account.
    let (status, _) = send_to(
        &state,
        Method::DELETE,
        &format!("/api/users/{user_id}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_to(
        &state,
        Method::POST,
        "/login",
        None,
        Some(serde_json::json!({"username": "upgrade_me", "password": "hunter22"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stats_reflect_seeded_data() {
    let state = seeded_state();
    let admin = admin_token(&state).await;

    let (status, body) = send_to(
        &state,
        Method::GET,
        "/api/users/stats",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_users"], 1);
    assert_eq!(body["total_courses"], 2);
    assert_eq!(body["average_courses_per_user"], 2.0);
}

#[tokio::test]
async fn test_unknown_captcha_rejected() {
    let state = seeded_state();

    // A challenge id that was never issued (or was already consumed or
    // swept) is indistinguishable from a wrong answer.
    let (status, body) = send_to(
        &state,
        Method::POST,
        "/register",
        None,
        Some(serde_json::json!({
            "username": "nobody",
            "password": "hunter22",
            "captcha_id": "00000000-0000-0000-0000-000000000000",
            "captcha_text": "ABCD",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid CAPTCHA");
}

#[tokio::test]
async fn test_protected_surface_fails_closed() {
    let state = seeded_state();

    for (method, uri) in [
        (Method::GET, "/api/user/hearts"),
        (Method::POST, "/api/user/hearts/lose"),
        (Method::POST, "/api/user/hearts/reward"),
        (Method::POST, "/api/hearts/consecutive"),
        (Method::GET, "/api/users"),
        (Method::GET, "/api/users/progress"),
        (Method::POST, "/api/change-password"),
    ] {
        let (status, _) = send_to(&state, method.clone(), uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "expected 401 for {uri}");
    }
}
