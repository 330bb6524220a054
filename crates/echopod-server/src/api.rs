//! Router assembly and shared application state.
//!
//! # Endpoints
//!
//! Public: `GET /`, `GET /captcha`, `POST /register`, `POST /login`, static
//! `GET /uploads/*`. Everything under `/api` requires (or, for the course
//! listing, accepts) a bearer token; see the [`crate::routes`] modules for
//! the handlers.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use echopod_core::captcha::CaptchaStore;
use echopod_store::Store;

use crate::auth::JwtAuth;
use crate::config::Config;
use crate::error::Result;
use crate::routes;

/// Shared application state for the HTTP server.
///
/// The store sits behind an async mutex: each handler holds the lock for its
/// whole read-modify-write, which is what makes every ledger operation a
/// single atomic commit against the one owning row.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// SQLite store, serialized behind a lock.
    pub store: Mutex<Store>,
    /// Outstanding CAPTCHA challenges.
    pub captcha: CaptchaStore,
    /// Access-token authority.
    pub jwt: JwtAuth,
}

impl AppState {
    /// Builds the application state from configuration and an opened store.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured JWT secret is unusable.
    pub fn new(config: Config, store: Store) -> Result<Self> {
        let jwt = JwtAuth::new(config.jwt_secret.clone(), config.token_expiry_hours)?;
        let captcha = CaptchaStore::new(Duration::minutes(i64::from(config.captcha_ttl_minutes)));
        Ok(Self {
            config,
            store: Mutex::new(store),
            captcha,
            jwt,
        })
    }
}

/// Simple `{"message": ...}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome description.
    pub message: String,
}

impl MessageResponse {
    /// Creates a message response.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Creates the HTTP router with all endpoints and middleware.
///
/// Middleware: permissive CORS (the SPA frontend is served from a different
/// origin), request tracing, and a body limit sized for course uploads.
/// Uploaded files are served statically under `/uploads`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/courses", post(routes::courses::create_course))
        .route("/courses/all", get(routes::courses::list_courses))
        .route(
            "/courses/:course_id",
            get(routes::courses::get_course)
                .put(routes::courses::update_course)
                .delete(routes::courses::delete_course),
        )
        .route(
            "/courses/:course_id/sentences",
            get(routes::courses::course_sentences),
        )
        .route(
            "/courses/:course_id/complete",
            post(routes::progress::complete_course),
        )
        .route(
            "/courses/:course_id/levels/completed",
            get(routes::progress::completed_levels),
        )
        .route(
            "/courses/:course_id/levels/:level_index/complete",
            post(routes::progress::complete_level),
        )
        .route("/users", get(routes::users::list_users))
        .route("/users/stats", get(routes::users::user_stats))
        .route("/users/progress", get(routes::progress::user_progress))
        .route(
            "/users/:user_id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route("/user/hearts", get(routes::hearts::get_hearts))
        .route("/user/hearts/lose", post(routes::hearts::lose_heart))
        .route("/user/hearts/reward", post(routes::hearts::reward_hearts))
        .route(
            "/hearts/consecutive",
            post(routes::hearts::adjust_consecutive),
        )
        .route("/change-password", post(routes::accounts::change_password));

    Router::new()
        .route("/", get(root))
        .route("/captcha", get(routes::accounts::get_captcha))
        .route("/register", post(routes::accounts::register))
        .route("/login", post(routes::accounts::login))
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Handler for `GET /`. Liveness probe.
async fn root() -> &'static str {
    "EchoPod backend is running"
}

// ============================================================================
// Test support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::util::ServiceExt;

    use super::testing::{insert_user, send_json, test_state, token_for};
    use super::*;

    #[tokio::test]
    async fn test_root_liveness() {
        let state = test_state();
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"EchoPod backend is running");
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let state = test_state();
        let (status, _) = send_json(&state, Method::GET, "/api/unknown", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let state = test_state();
        let (status, body) = send_json(&state, Method::GET, "/api/user/hearts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("missing or invalid"));
    }

    #[tokio::test]
    async fn test_protected_route_rejects_garbage_token() {
        let state = test_state();
        let (status, _) = send_json(
            &state,
            Method::GET,
            "/api/user/hearts",
            Some("not-a-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_route_accepts_valid_token() {
        let state = test_state();
        let user_id = insert_user(&state, "alice", "password", false, false).await;
        let token = token_for(&state, user_id).await;

        let (status, body) = send_json(
            &state,
            Method::GET,
            "/api/user/hearts",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_hearts"], 5);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let state = test_state();
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/user/hearts")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success() || response.status() == StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_app_state_rejects_short_secret() {
        let config = Config {
            jwt_secret: "short".to_string(),
            ..Config::default()
        };
        let store = Store::open_in_memory().unwrap();
        assert!(AppState::new(config, store).is_err());
    }
}
