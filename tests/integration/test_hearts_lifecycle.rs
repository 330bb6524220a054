//! End-to-end tests for the hearts ledger over HTTP
//!
//! Walks a learner account through the full gamification lifecycle: newbie
//! shield, deductions, bonus-first spending, streak rewards, the zero-hearts
//! rejection, and passive regeneration — asserting the persisted state after
//! each step, not just the response bodies.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{Duration, Utc};
use echopod_core::hearts::HeartState;
use echopod_server::{create_router, AppState, Config};
use echopod_store::{NewUser, Store};
use tower::util::ServiceExt;

fn fresh_state() -> Arc<AppState> {
    let upload_dir = tempfile::tempdir().expect("temp dir");
    let config = Config {
        upload_dir: upload_dir.into_path().to_string_lossy().into_owned(),
        ..Config::default()
    };
    let store = Store::open_in_memory().expect("open store");
    Arc::new(AppState::new(config, store).expect("app state"))
}

/// Inserts a learner and returns (id, bearer token).
async fn learner(state: &Arc<AppState>, username: &str) -> (i64, String) {
    let store = state.store.lock().await;
    let user_id = store
        .insert_user(
            &NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: echopod_server::hash_password("hunter22").expect("hash"),
                is_admin: false,
                is_vip: false,
                hearts: HeartState::new(Utc::now()),
            },
            Utc::now(),
        )
        .expect("insert user");
    let user = store.find_user_by_id(user_id).expect("query").expect("user");
    let token = state.jwt.issue(&user).expect("token");
    (user_id, token)
}

/// Rewrites the persisted ledger for scenario setup.
async fn patch_hearts(state: &Arc<AppState>, user_id: i64, patch: impl FnOnce(&mut HeartState)) {
    let store = state.store.lock().await;
    let mut hearts = store
        .find_user_by_id(user_id)
        .expect("query")
        .expect("user")
        .hearts;
    patch(&mut hearts);
    store.update_hearts(user_id, &hearts).expect("update");
}

async fn stored_hearts(state: &Arc<AppState>, user_id: i64) -> HeartState {
    let store = state.store.lock().await;
    store
        .find_user_by_id(user_id)
        .expect("query")
        .expect("user")
        .hearts
}

async fn call(
    state: &Arc<AppState>,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let router = create_router(Arc::clone(state));
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    let request = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(json.to_string())).expect("request")
        }
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

async fn lose(
    state: &Arc<AppState>,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    call(state, Method::POST, "/api/user/hearts/lose", token, Some(body)).await
}

#[tokio::test]
async fn test_newbie_shield_then_deductions_to_rejection() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "rookie").await;

    // Three shielded mistakes.
    for remaining in [2, 1, 0] {
        let (status, body) = lose(&state, &token, serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hearts_lost"], 0);
        assert_eq!(body["newbie_protection_remaining"], remaining);
    }
    let hearts = stored_hearts(&state, user_id).await;
    assert!(!hearts.is_newbie);
    assert_eq!(hearts.hearts, 5);

    // Five real deductions drain the ledger.
    for expected_remaining in (0..5).rev() {
        let (status, body) = lose(&state, &token, serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hearts_lost"], 1);
        assert_eq!(body["remaining_hearts"], expected_remaining);
    }

    // The sixth is rejected with no state change.
    let before = stored_hearts(&state, user_id).await;
    let (status, body) = lose(&state, &token, serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No hearts left");
    assert_eq!(stored_hearts(&state, user_id).await, before);
}

#[tokio::test]
async fn test_bonus_hearts_spend_before_regular() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "banker").await;
    patch_hearts(&state, user_id, |h| {
        h.is_newbie = false;
        h.newbie_protection_count = 0;
        h.hearts = 3;
        h.bonus_hearts = 2;
    })
    .await;

    let (_, body) = lose(&state, &token, serde_json::json!({})).await;
    assert_eq!(body["bonus_hearts"], 1);
    assert_eq!(body["current_hearts"], 3);

    let (_, body) = lose(&state, &token, serde_json::json!({})).await;
    assert_eq!(body["bonus_hearts"], 0);
    assert_eq!(body["current_hearts"], 3);

    let (_, body) = lose(&state, &token, serde_json::json!({})).await;
    assert_eq!(body["bonus_hearts"], 0);
    assert_eq!(body["current_hearts"], 2);
}

#[tokio::test]
async fn test_streak_builds_to_reward_and_breaks_on_wrong_answer() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "streaker").await;
    patch_hearts(&state, user_id, |h| {
        h.is_newbie = false;
        h.newbie_protection_count = 0;
        h.hearts = 2;
    })
    .await;

    // Nine correct answers: no payout yet.
    for i in 1..=9 {
        let (_, body) = call(
            &state,
            Method::POST,
            "/api/user/hearts/reward",
            &token,
            Some(serde_json::json!({"type": "correct_answer"})),
        )
        .await;
        assert_eq!(body["consecutive_correct"], i);
        assert_eq!(body["hearts_rewarded"], 0);
    }

    // The tenth pays out one heart.
    let (_, body) = call(
        &state,
        Method::POST,
        "/api/user/hearts/reward",
        &token,
        Some(serde_json::json!({"type": "correct_answer"})),
    )
    .await;
    assert_eq!(body["consecutive_correct"], 10);
    assert_eq!(body["hearts_rewarded"], 1);
    assert_eq!(body["current_hearts"], 3);

    // Viewing the original text deducts but keeps the streak alive.
    let (_, body) = lose(
        &state,
        &token,
        serde_json::json!({"action_type": "view_original"}),
    )
    .await;
    assert_eq!(body["hearts_lost"], 1);
    assert_eq!(stored_hearts(&state, user_id).await.consecutive_correct, 10);

    // A wrong answer breaks it.
    let (_, body) = lose(&state, &token, serde_json::json!({})).await;
    assert_eq!(body["hearts_lost"], 1);
    assert_eq!(stored_hearts(&state, user_id).await.consecutive_correct, 0);
}

#[tokio::test]
async fn test_perfect_course_and_streak_spill() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "perfecto").await;
    patch_hearts(&state, user_id, |h| {
        h.is_newbie = false;
        h.newbie_protection_count = 0;
        h.consecutive_correct = 9;
    })
    .await;

    // At full hearts the streak payout spills into bonus.
    let (_, body) = call(
        &state,
        Method::POST,
        "/api/user/hearts/reward",
        &token,
        Some(serde_json::json!({"type": "correct_answer"})),
    )
    .await;
    assert_eq!(body["current_hearts"], 5);
    assert_eq!(body["bonus_hearts"], 1);

    // Perfect-course payout stacks two more bonus hearts.
    let (_, body) = call(
        &state,
        Method::POST,
        "/api/user/hearts/reward",
        &token,
        Some(serde_json::json!({"type": "perfect_course"})),
    )
    .await;
    assert_eq!(body["hearts_rewarded"], 2);
    assert_eq!(body["bonus_hearts"], 3);
    assert_eq!(body["remaining_hearts"], 8);

    let hearts = stored_hearts(&state, user_id).await;
    assert_eq!(hearts.bonus_hearts, 3);
    assert_eq!(hearts.total_hearts(), 8);
}

#[tokio::test]
async fn test_practice_mode_never_deducts() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "practicer").await;
    patch_hearts(&state, user_id, |h| {
        h.is_newbie = false;
        h.newbie_protection_count = 0;
        h.hearts = 1;
    })
    .await;

    for _ in 0..5 {
        let (status, body) = lose(
            &state,
            &token,
            serde_json::json!({"is_practice_mode": true}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hearts_lost"], 0);
    }
    assert_eq!(stored_hearts(&state, user_id).await.hearts, 1);
}

#[tokio::test]
async fn test_query_regenerates_hourly_and_resets_daily() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "sleeper").await;

    // Two hearts, last touched three hours ago: query recovers to max.
    patch_hearts(&state, user_id, |h| {
        h.is_newbie = false;
        h.newbie_protection_count = 0;
        h.hearts = 2;
        h.last_heart_update = Utc::now() - Duration::hours(3);
    })
    .await;

    let (status, body) = call(&state, Method::GET, "/api/user/hearts", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_hearts"], 5);
    assert_eq!(body["next_recovery_time"], serde_json::Value::Null);

    // Empty ledger from yesterday: the daily reset restores the cap even
    // though fewer than regen-interval hours elapsed today.
    patch_hearts(&state, user_id, |h| {
        h.hearts = 0;
        h.last_heart_update = Utc::now() - Duration::minutes(5);
        h.last_daily_reset = (Utc::now() - Duration::days(1)).date_naive();
    })
    .await;

    let (_, body) = call(&state, Method::GET, "/api/user/hearts", &token, None).await;
    assert_eq!(body["current_hearts"], 5);

    // Queries on the same day are idempotent.
    let before = stored_hearts(&state, user_id).await;
    let (_, body) = call(&state, Method::GET, "/api/user/hearts", &token, None).await;
    assert_eq!(body["current_hearts"], 5);
    assert_eq!(stored_hearts(&state, user_id).await, before);
}

#[tokio::test]
async fn test_consecutive_adjustment_roundtrip() {
    let state = fresh_state();
    let (user_id, token) = learner(&state, "counter").await;

    for expected in [1, 2] {
        let (_, body) = call(
            &state,
            Method::POST,
            "/api/hearts/consecutive",
            &token,
            Some(serde_json::json!({"increment": true})),
        )
        .await;
        assert_eq!(body["consecutive_correct"], expected);
    }

    let (_, body) = call(
        &state,
        Method::POST,
        "/api/hearts/consecutive",
        &token,
        Some(serde_json::json!({"increment": false})),
    )
    .await;
    assert_eq!(body["consecutive_correct"], 0);
    assert_eq!(stored_hearts(&state, user_id).await.consecutive_correct, 0);
}
