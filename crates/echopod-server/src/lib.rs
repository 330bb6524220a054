//! EchoPod HTTP API.
//!
//! Assembles the axum router over the domain rules (`echopod-core`) and the
//! SQLite store (`echopod-store`): bearer-token auth, CAPTCHA-gated
//! registration, course upload and serving, learner progress, and the heart
//! ledger endpoints.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

pub use api::{create_router, AppState, MessageResponse};
pub use auth::{hash_password, verify_password, AuthUser, Claims, JwtAuth, MaybeUser};
pub use config::Config;
pub use error::{ApiError, ErrorBody, Result, ServerError};
