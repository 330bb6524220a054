//! Error types for the EchoPod server.
//!
//! Two layers: [`ServerError`] covers startup-time faults (configuration,
//! key material), while [`ApiError`] is the request-scoped taxonomy that maps
//! onto HTTP responses. Every `ApiError` renders as `{"message": ...}` JSON
//! with the corresponding status code; the insufficient-hearts rejection
//! additionally carries `"success": false` so clients can branch on it.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use echopod_store::StoreError;

/// A specialized `Result` type for server startup operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised while bringing the server up.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your echopod.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the operator.
        suggestion: String,
    },

    /// JWT key material was unusable.
    #[error("Invalid JWT secret: {message}\n\nSuggestion: Set jwtSecret in echopod.json to a random string of at least 32 characters")]
    InvalidJwtSecret {
        /// Description of the problem.
        message: String,
    },

    /// Storage failure during startup or seeding.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// General I/O error during startup.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a new `ConfigParseError`.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError`.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

// ============================================================================
// Request-scoped errors
// ============================================================================

/// JSON error body returned on request failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Present (and `false`) only on rejections that clients branch on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Human-readable description of the failure.
    pub message: String,
}

/// Errors surfaced to API clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Missing, invalid, or expired bearer token.
    #[error("Token is missing or invalid")]
    Unauthenticated,

    /// Login with a bad username/password pair.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The authenticated user may not perform this operation.
    #[error("{0}")]
    Forbidden(String),

    /// The addressed resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request body or parameters were unusable.
    #[error("{0}")]
    MalformedRequest(String),

    /// A heart deduction was requested with zero total hearts.
    #[error("No hearts left")]
    InsufficientHearts,

    /// A uniqueness constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// An unexpected server-side failure; details go to the log, not the
    /// client.
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MalformedRequest(_) | Self::InsufficientHearts => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref detail) = self {
            tracing::error!(detail = %detail, "Internal error while handling request");
        }

        let body = ErrorBody {
            success: matches!(self, Self::InsufficientHearts).then_some(false),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UsernameTaken { .. } => {
                Self::Conflict("Username already exists".to_string())
            }
            StoreError::Sqlite(e) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("nope".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("gone".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::MalformedRequest("bad".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InsufficientHearts.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("dup".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_insufficient_hearts_body_carries_success_flag() {
        let body = ErrorBody {
            success: Some(false),
            message: ApiError::InsufficientHearts.to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""success":false"#));
        assert!(json.contains("No hearts left"));
    }

    #[test]
    fn test_plain_errors_omit_success_flag() {
        let body = ErrorBody {
            success: None,
            message: "Token is missing or invalid".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("success"));
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let err = ApiError::Internal("secret connection string".to_string());
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_username_conflict_conversion() {
        let taken = StoreError::UsernameTaken {
            username: "alice".to_string(),
        };
        let api: ApiError = taken.into();
        assert_eq!(api, ApiError::Conflict("Username already exists".to_string()));
        assert_eq!(api.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_server_error_messages_carry_suggestions() {
        let err = ServerError::config_validation(
            "tokenExpiryHours must be greater than 0",
            "Set tokenExpiryHours to at least 1 in your echopod.json",
        );
        let msg = err.to_string();
        assert!(msg.contains("Suggestion"));
        assert!(msg.contains("tokenExpiryHours"));
    }
}
