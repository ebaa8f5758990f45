//! Centralized error types for Haven.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP-friendly
//! error variants that convert directly into Matrix-style API responses
//! (`{"errcode": "M_…", "error": "…"}`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Core application error type used across all Haven services.
#[derive(Debug, thiserror::Error)]
pub enum HavenError {
    // === Auth errors ===
    #[error("Missing access token")]
    MissingToken,

    #[error("Unrecognised access token")]
    UnknownToken,

    // === Request errors ===
    #[error("{message}")]
    BadJson { message: String },

    #[error("{message}")]
    InvalidParam { message: String },

    #[error("{message}")]
    UnsupportedRoomVersion { message: String },

    // === Resource errors ===
    #[error("{message}")]
    NotFound { message: String },

    // === Infrastructure errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    errcode: &'static str,
    error: String,
}

impl HavenError {
    pub fn bad_json(message: impl Into<String>) -> Self {
        Self::BadJson { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::UnknownToken => StatusCode::UNAUTHORIZED,
            Self::BadJson { .. }
            | Self::InvalidParam { .. }
            | Self::UnsupportedRoomVersion { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Matrix `errcode` for programmatic handling by clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "M_MISSING_TOKEN",
            Self::UnknownToken => "M_UNKNOWN_TOKEN",
            Self::BadJson { .. } => "M_BAD_JSON",
            Self::InvalidParam { .. } => "M_INVALID_PARAM",
            Self::UnsupportedRoomVersion { .. } => "M_UNSUPPORTED_ROOM_VERSION",
            Self::NotFound { .. } => "M_NOT_FOUND",
            Self::Database(_) | Self::Internal(_) => "M_UNKNOWN",
        }
    }
}

impl IntoResponse for HavenError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = match &self {
            HavenError::Database(e) => {
                tracing::error!("Database error: {e}");
                "Internal Server Error".to_string()
            }
            HavenError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse { errcode: self.error_code(), error: message };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using HavenError.
pub type HavenResult<T> = Result<T, HavenError>;
