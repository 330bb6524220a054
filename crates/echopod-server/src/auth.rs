//! Authentication: password hashing, JWT issue/verify, and request
//! extractors.
//!
//! Tokens are signed with HS256 and carry the user id plus role flags; the
//! [`AuthUser`] extractor resolves the bearer token to a fresh user record
//! and fails closed with 401 on anything missing, invalid, or expired.
//! Passwords are hashed with Argon2id in PHC string format.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use echopod_store::User;

use crate::api::AppState;
use crate::error::{ApiError, ServerError};

// ============================================================================
// Passwords
// ============================================================================

/// Hashes a password with Argon2id.
///
/// Returns the PHC-formatted hash string, which embeds the salt and
/// parameters.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

/// Verifies a password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

// ============================================================================
// Tokens
// ============================================================================

/// Payload carried inside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user's row id.
    pub user_id: i64,
    /// Login name at issue time.
    pub username: String,
    /// VIP flag at issue time.
    pub is_vip: bool,
    /// Admin flag at issue time.
    pub is_admin: bool,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct JwtAuth {
    secret: String,
    expiry_seconds: u64,
}

impl JwtAuth {
    /// Creates a token authority from the configured secret.
    ///
    /// # Errors
    ///
    /// Returns an error when the secret is empty or shorter than 32
    /// characters.
    pub fn new(secret: impl Into<String>, expiry_hours: u32) -> Result<Self, ServerError> {
        let secret = secret.into();
        if secret.len() < 32 {
            return Err(ServerError::InvalidJwtSecret {
                message: "secret must be at least 32 characters".to_string(),
            });
        }
        Ok(Self {
            secret,
            expiry_seconds: u64::from(expiry_hours) * 3600,
        })
    }

    /// Issues a token for an authenticated user.
    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ApiError::Internal(format!("system time error: {e}")))?
            .as_secs();

        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            is_vip: user.is_vip,
            is_admin: user.is_admin,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verifies a token and returns its claims.
    ///
    /// Any failure — bad signature, expiry, garbage input — collapses to
    /// [`ApiError::Unauthenticated`]; the distinction is logged, not
    /// returned.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(reason = %e, "Rejected bearer token");
            ApiError::Unauthenticated
        })
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// Only the `Bearer <token>` form is accepted.
#[must_use]
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

// ============================================================================
// Extractors
// ============================================================================

/// An authenticated user, resolved from the bearer token.
///
/// Rejects with 401 when the token is missing/invalid/expired or the account
/// no longer exists.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// An optional authenticated user for endpoints that personalize their
/// response but do not require login. Invalid tokens degrade to anonymous
/// rather than rejecting, matching the public course listing.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

async fn resolve_user(parts: &Parts, state: &Arc<AppState>) -> Result<User, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = extract_bearer_token(header).ok_or(ApiError::Unauthenticated)?;
    let claims = state.jwt.verify(token)?;

    let store = state.store.lock().await;
    store
        .find_user_by_id(claims.user_id)?
        .ok_or(ApiError::Unauthenticated)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state).await.map(Self)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve_user(parts, state).await.ok()))
    }
}
