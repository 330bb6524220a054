//! Learner progress handlers: course completion, level completion.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{AppState, MessageResponse};
use crate::auth::AuthUser;
use crate::error::ApiError;

/// Handler for `GET /api/courses/{id}/levels/completed`.
///
/// Returns the level indexes the user has finished in this course.
pub async fn completed_levels(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    UrlPath(course_id): UrlPath<i64>,
) -> Result<Json<Vec<i64>>, ApiError> {
    let store = state.store.lock().await;
    let levels = store.completed_levels(user.id, course_id)?;
    Ok(Json(levels))
}

/// Handler for `POST /api/courses/{id}/levels/{index}/complete`.
///
/// Idempotent: the first completion returns 201, repeats return 200.
pub async fn complete_level(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    UrlPath((course_id, level_index)): UrlPath<(i64, i64)>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let store = state.store.lock().await;
    store
        .find_course(course_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {course_id} not found")))?;
    let newly_completed = store.insert_level_completion(user.id, course_id, level_index)?;
    drop(store);

    if newly_completed {
        info!(user_id = user.id, course_id, level_index, "Level completed");
        Ok((
            StatusCode::CREATED,
            Json(MessageResponse::new("Level marked as complete")),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(MessageResponse::new("Level already completed")),
        ))
    }
}

/// Response body for course completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteCourseResponse {
    /// Outcome description.
    pub message: String,
    /// Always `true` after this call.
    pub completed: bool,
    /// When the completion was recorded.
    pub completed_at: DateTime<Utc>,
}

/// Handler for `POST /api/courses/{id}/complete`.
pub async fn complete_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    UrlPath(course_id): UrlPath<i64>,
) -> Result<Json<CompleteCourseResponse>, ApiError> {
    let now = Utc::now();

    let store = state.store.lock().await;
    store
        .find_course(course_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {course_id} not found")))?;
    store.mark_course_complete(user.id, course_id, now)?;
    drop(store);

    info!(user_id = user.id, course_id, "Course completed");

    Ok(Json(CompleteCourseResponse {
        message: "Course marked as completed".to_string(),
        completed: true,
        completed_at: now,
    }))
}

/// One entry in the per-user progress listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressItem {
    /// The course this record covers.
    pub course_id: i64,
    /// Course title.
    pub course_title: String,
    /// Whether the course is completed.
    pub completed: bool,
    /// When it was completed, if it was.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Handler for `GET /api/users/progress`.
pub async fn user_progress(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ProgressItem>>, ApiError> {
    let store = state.store.lock().await;
    let records = store.progress_for_user(user.id)?;
    drop(store);

    Ok(Json(
        records
            .into_iter()
            .map(|record| ProgressItem {
                course_id: record.course_id,
                course_title: record.course_title,
                completed: record.completed,
                completed_at: record.completed_at,
            })
            .collect(),
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::Utc;
    use echopod_core::hearts::Difficulty;
    use echopod_store::NewCourse;

    use crate::api::testing::{insert_user, send_json, test_state, token_for};
    use crate::api::AppState;

    async fn seed_course(state: &std::sync::Arc<AppState>, owner: i64, title: &str) -> i64 {
        let store = state.store.lock().await;
        store
            .insert_course(&NewCourse {
                title: title.to_string(),
                difficulty: Difficulty::Normal,
                description: None,
                original_audio_path: None,
                srt_path: None,
                user_id: owner,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_level_completion_flow() {
        let state = test_state();
        let user_id = insert_user(&state, "learner", "password", false, false).await;
        let token = token_for(&state, user_id).await;
        let course_id = seed_course(&state, user_id, "Levels").await;

        // Nothing completed yet.
        let (_, body) = send_json(
            &state,
            Method::GET,
            &format!("/api/courses/{course_id}/levels/completed"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 0);

        // First completion is 201; the repeat is 200.
        let uri = format!("/api/courses/{course_id}/levels/0/complete");
        let (status, body) = send_json(&state, Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Level marked as complete");

        let (status, body) = send_json(&state, Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Level already completed");

        let (_, body) = send_json(
            &state,
            Method::POST,
            &format!("/api/courses/{course_id}/levels/3/complete"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["message"], "Level marked as complete");

        let (_, levels) = send_json(
            &state,
            Method::GET,
            &format!("/api/courses/{course_id}/levels/completed"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(levels, serde_json::json!([0, 3]));
    }

    #[tokio::test]
    async fn test_complete_course_and_progress_listing() {
        let state = test_state();
        let user_id = insert_user(&state, "learner", "password", false, false).await;
        let token = token_for(&state, user_id).await;
        let course_id = seed_course(&state, user_id, "Business English").await;
        seed_course(&state, user_id, "Untouched Course").await;

        let (status, body) = send_json(
            &state,
            Method::POST,
            &format!("/api/courses/{course_id}/complete"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed"], true);
        assert!(body["completed_at"].is_string());

        // Only the completed course shows up in the progress listing.
        let (_, progress) = send_json(
            &state,
            Method::GET,
            "/api/users/progress",
            Some(&token),
            None,
        )
        .await;
        let progress = progress.as_array().unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0]["course_title"], "Business English");
        assert_eq!(progress[0]["completed"], true);
    }

    #[tokio::test]
    async fn test_complete_unknown_course_404() {
        let state = test_state();
        let user_id = insert_user(&state, "learner", "password", false, false).await;
        let token = token_for(&state, user_id).await;

        let (status, _) = send_json(
            &state,
            Method::POST,
            "/api/courses/404/complete",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_progress_endpoints_require_auth() {
        let state = test_state();
        let (status, _) =
            send_json(&state, Method::GET, "/api/users/progress", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send_json(
            &state,
            Method::POST,
            "/api/courses/1/levels/0/complete",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_completions_are_per_user() {
        let state = test_state();
        let alice = insert_user(&state, "alice", "password", false, false).await;
        let bob = insert_user(&state, "bob", "password", false, false).await;
        let alice_token = token_for(&state, alice).await;
        let bob_token = token_for(&state, bob).await;
        let course_id = seed_course(&state, alice, "Shared Course").await;

        send_json(
            &state,
            Method::POST,
            &format!("/api/courses/{course_id}/levels/1/complete"),
            Some(&alice_token),
            None,
        )
        .await;

        let (_, bob_levels) = send_json(
            &state,
            Method::GET,
            &format!("/api/courses/{course_id}/levels/completed"),
            Some(&bob_token),
            None,
        )
        .await;
        assert_eq!(bob_levels.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_recompleting_updates_timestamp() {
        let state = test_state();
        let user_id = insert_user(&state, "learner", "password", false, false).await;
        let token = token_for(&state, user_id).await;
        let course_id = seed_course(&state, user_id, "Repeatable").await;
        let uri = format!("/api/courses/{course_id}/complete");

        send_json(&state, Method::POST, &uri, Some(&token), None).await;
        let before = Utc::now();
        send_json(&state, Method::POST, &uri, Some(&token), None).await;

        let store = state.store.lock().await;
        let records = store.progress_for_user(user_id).unwrap();
        assert_eq!(records.len(), 1);
        // The second completion refreshed the timestamp.
        assert!(records[0].completed_at.unwrap() >= before - chrono::Duration::seconds(1));
    }
}
