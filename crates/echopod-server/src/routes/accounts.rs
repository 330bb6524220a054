//! Account handlers: CAPTCHA, registration, login, password change.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use echopod_core::captcha::CaptchaVerification;
use echopod_core::hearts::HeartState;
use echopod_store::NewUser;

use crate::api::{AppState, MessageResponse};
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::ApiError;

/// Accepted login names: 3-80 word characters.
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a constant; a failure here is a programming error.
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"^\w{3,80}$").unwrap();
    re
});

/// Minimum accepted password length for password changes.
const MIN_PASSWORD_LEN: usize = 6;

// ============================================================================
// CAPTCHA
// ============================================================================

/// Response body for the CAPTCHA endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaResponse {
    /// Challenge id to echo back at registration.
    pub id: Uuid,
    /// Inline image data URI.
    pub image: String,
}

/// Handler for `GET /captcha`.
pub async fn get_captcha(State(state): State<Arc<AppState>>) -> Json<CaptchaResponse> {
    let issued = state.captcha.issue(Utc::now());
    Json(CaptchaResponse {
        id: issued.id,
        image: issued.image,
    })
}

// ============================================================================
// Registration
// ============================================================================

/// Request body for registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Desired login name.
    #[serde(default)]
    pub username: String,
    /// Password in the clear (hashed immediately).
    #[serde(default)]
    pub password: String,
    /// Challenge id from `GET /captcha`.
    #[serde(default)]
    pub captcha_id: Option<Uuid>,
    /// The user's reading of the challenge image.
    #[serde(default)]
    pub captcha_text: String,
}

/// Handler for `POST /register`.
///
/// Verifies the single-use CAPTCHA first, then validates and creates the
/// account with a full heart ledger.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let now = Utc::now();
    let captcha_id = request
        .captcha_id
        .ok_or_else(|| ApiError::MalformedRequest("Invalid CAPTCHA".to_string()))?;
    match state.captcha.verify(captcha_id, &request.captcha_text, now) {
        CaptchaVerification::Passed => {}
        CaptchaVerification::Expired => {
            return Err(ApiError::MalformedRequest("CAPTCHA has expired".to_string()));
        }
        CaptchaVerification::Mismatch | CaptchaVerification::NotFound => {
            return Err(ApiError::MalformedRequest("Invalid CAPTCHA".to_string()));
        }
    }

    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::MalformedRequest(
            "Username and password are required".to_string(),
        ));
    }
    if !USERNAME_RE.is_match(&request.username) {
        return Err(ApiError::MalformedRequest(
            "Username must be 3-80 letters, digits, or underscores".to_string(),
        ));
    }

    let password_hash = hash_password(&request.password)?;
    let new_user = NewUser {
        username: request.username.clone(),
        // No email field on the signup form; synthesize a placeholder.
        email: format!("{}@example.com", request.username),
        password_hash,
        is_admin: false,
        is_vip: false,
        hearts: HeartState::with_max_hearts(state.config.max_hearts, now),
    };

    let store = state.store.lock().await;
    let user_id = store.insert_user(&new_user, now)?;
    drop(store);

    info!(user_id, username = %request.username, "Account registered");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Registration successful")),
    ))
}

// ============================================================================
// Login
// ============================================================================

/// Request body for login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password in the clear.
    #[serde(default)]
    pub password: String,
}

/// Response body for a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// Whether the account has VIP privileges.
    pub is_vip: bool,
    /// Whether the account has admin privileges.
    pub is_admin: bool,
}

/// Handler for `POST /login`.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::MalformedRequest(
            "Username and password are required".to_string(),
        ));
    }

    let store = state.store.lock().await;
    let Some(user) = store.find_user_by_username(&request.username)? else {
        warn!(username = %request.username, "Login attempt for unknown user");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&request.password, &user.password_hash) {
        warn!(username = %request.username, "Login attempt with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    store.set_last_login(user.id, Utc::now())?;
    drop(store);

    let token = state.jwt.issue(&user)?;
    info!(user_id = user.id, username = %user.username, "Login succeeded");

    Ok(Json(LoginResponse {
        token,
        is_vip: user.is_vip,
        is_admin: user.is_admin,
    }))
}

// ============================================================================
// Password change
// ============================================================================

/// Request body for a password change.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    /// Current password, re-verified before the change.
    #[serde(default)]
    pub current_password: String,
    /// Replacement password.
    #[serde(default)]
    pub new_password: String,
}

/// Handler for `POST /api/change-password`.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if request.current_password.is_empty() || request.new_password.is_empty() {
        return Err(ApiError::MalformedRequest(
            "Current password and new password are required".to_string(),
        ));
    }

    if !verify_password(&request.current_password, &user.password_hash) {
        return Err(ApiError::MalformedRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    if request.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::MalformedRequest(format!(
            "New password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let password_hash = hash_password(&request.new_password)?;
    let store = state.store.lock().await;
    store.update_password(user.id, &password_hash)?;
    drop(store);

    info!(user_id = user.id, "Password changed");
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

// ============================================================================
// Tests
// ============================================================================
