//! User management handlers (admin surface) and aggregate stats.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use echopod_store::UserUpdate;

use crate::api::{AppState, MessageResponse};
use crate::auth::{hash_password, AuthUser};
use crate::error::ApiError;

use super::courses::remove_stored_files;

/// One entry in the user listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListItem {
    /// User id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Number of courses this user has created.
    pub created_courses: i64,
    /// Administrator flag.
    pub is_admin: bool,
}

/// Handler for `GET /api/users`.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<UserListItem>>, ApiError> {
    let store = state.store.lock().await;
    let users = store.list_users()?;
    let mut items = Vec::with_capacity(users.len());
    for user in users {
        items.push(UserListItem {
            created_courses: store.count_courses_by_user(user.id)?,
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        });
    }
    Ok(Json(items))
}

/// A course reference inside the user detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCourseRef {
    /// Course id.
    pub id: i64,
    /// Course title.
    pub title: String,
}

/// User detail returned by `GET /api/users/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    /// User id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Number of courses this user has created.
    pub created_courses: i64,
    /// The user's courses.
    pub courses: Vec<UserCourseRef>,
    /// Administrator flag.
    pub is_admin: bool,
}

/// Handler for `GET /api/users/{id}`.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    UrlPath(user_id): UrlPath<i64>,
) -> Result<Json<UserDetail>, ApiError> {
    let store = state.store.lock().await;
    let user = store
        .find_user_by_id(user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))?;
    let courses = store.courses_by_user(user_id)?;
    drop(store);

    let courses: Vec<UserCourseRef> = courses
        .into_iter()
        .map(|course| UserCourseRef {
            id: course.id,
            title: course.title,
        })
        .collect();

    Ok(Json(UserDetail {
        id: user.id,
        username: user.username,
        created_courses: i64::try_from(courses.len()).unwrap_or(i64::MAX),
        courses,
        is_admin: user.is_admin,
    }))
}

/// Request body for `PUT /api/users/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    /// Replacement login name.
    #[serde(default)]
    pub username: Option<String>,
    /// Replacement password; empty strings are ignored.
    #[serde(default)]
    pub password: Option<String>,
    /// Replacement VIP flag.
    #[serde(default)]
    pub is_vip: Option<bool>,
}

/// Handler for `PUT /api/users/{id}`. Admin only.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AuthUser(current): AuthUser,
    UrlPath(user_id): UrlPath<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !current.is_admin {
        return Err(ApiError::Forbidden("Permission denied".to_string()));
    }

    let password_hash = request
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(hash_password)
        .transpose()?;

    let store = state.store.lock().await;
    store
        .find_user_by_id(user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))?;
    store.update_user(
        user_id,
        &UserUpdate {
            username: request.username,
            password_hash,
            is_vip: request.is_vip,
        },
    )?;
    drop(store);

    info!(admin_id = current.id, user_id, "User updated");
    Ok(Json(MessageResponse::new("User updated successfully")))
}

/// Handler for `DELETE /api/users/{id}`. Admin only; cannot delete admins or
/// the caller's own account. Cascades the target's courses, sentences, and
/// stored files.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AuthUser(current): AuthUser,
    UrlPath(user_id): UrlPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !current.is_admin {
        return Err(ApiError::Forbidden("Permission denied".to_string()));
    }

    let store = state.store.lock().await;
    let target = store
        .find_user_by_id(user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))?;

    if target.is_admin {
        return Err(ApiError::MalformedRequest(
            "Cannot delete admin account".to_string(),
        ));
    }
    if target.id == current.id {
        return Err(ApiError::MalformedRequest(
            "Cannot delete your own account".to_string(),
        ));
    }

    let stored_files = store.file_paths_for_user_courses(user_id)?;
    store.delete_user(user_id)?;
    drop(store);

    remove_stored_files(&stored_files).await;

    info!(admin_id = current.id, user_id, "User deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

/// Aggregate platform statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Number of accounts.
    pub total_users: i64,
    /// Number of courses.
    pub total_courses: i64,
    /// Number of completed levels across all users.
    pub total_sentences: i64,
    /// Average courses created per user.
    pub average_courses_per_user: f64,
}

/// Handler for `GET /api/users/stats`.
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
) -> Result<Json<StatsResponse>, ApiError> {
    let store = state.store.lock().await;
    let total_users = store.count_users()?;
    let total_courses = store.count_courses()?;
    let total_sentences = store.count_level_completions()?;
    drop(store);

    #[allow(clippy::cast_precision_loss)]
    let average = if total_users > 0 {
        ((total_courses as f64 / total_users as f64) * 100.0).round() / 100.0
    } else {
        0.0
    };

    Ok(Json(StatsResponse {
        total_users,
        total_courses,
        total_sentences,
        average_courses_per_user: average,
    }))
}

// ============================================================================
// Tests
// ============================================================================
