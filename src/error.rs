// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// The taxonomy matters more than the HTTP mapping:
/// - `Config` is fatal and operator-visible; it must halt the operation
///   rather than degrade (e.g. never fall back to storing plaintext tokens).
/// - `Credential` means the stored token material is unusable and the user
///   must re-link their Peloton account; it is never retried blindly.
/// - `AuthExpired` is the one failure with a recovery path (token refresh),
///   attempted at most once per originating operation.
/// - `Api`/`Transport` are retried with backoff only inside the stack
///   synchronizer's clear/populate loop, surfaced as-is elsewhere.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Peloton session expired")]
    AuthExpired,

    #[error("Peloton API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether this failure should be resolved by refreshing the session.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, AppError::AuthExpired)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
            AppError::Credential(msg) => (
                StatusCode::UNAUTHORIZED,
                "credential_error",
                Some(msg.clone()),
            ),
            AppError::AuthExpired => (StatusCode::UNAUTHORIZED, "session_expired", None),
            AppError::Api { status, message } => (
                StatusCode::BAD_GATEWAY,
                "peloton_error",
                Some(format!("HTTP {}: {}", status, message)),
            ),
            AppError::Transport(msg) => (StatusCode::BAD_GATEWAY, "network_error", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
