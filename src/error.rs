// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::identity::IdentityError;
use crate::services::revocation::RevocationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Token has been revoked, please sign in again")]
    TokenRevoked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Upstream service unreachable: {message}")]
    UpstreamUnavailable { timed_out: bool, message: String },

    #[error("Revocation store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RevocationError> for AppError {
    fn from(err: RevocationError) -> Self {
        match err {
            RevocationError::InvalidToken(msg) => AppError::BadRequest(msg),
            RevocationError::StoreUnavailable(msg) => AppError::StoreUnavailable(msg),
        }
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
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::TokenRevoked => (
                StatusCode::UNAUTHORIZED,
                "token_revoked",
                Some(self.to_string()),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Identity(err) => match err {
                IdentityError::InvalidFormat(_) | IdentityError::AuthenticationFailed => (
                    StatusCode::BAD_REQUEST,
                    "invalid_identity",
                    Some(err.to_string()),
                ),
                IdentityError::Expired | IdentityError::BadSignature => (
                    StatusCode::UNAUTHORIZED,
                    "invalid_session",
                    Some(err.to_string()),
                ),
                IdentityError::Encryption(msg) => {
                    tracing::error!(error = %msg, "Identity encryption failure");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some(self.to_string()),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                Some(msg.clone()),
            ),
            AppError::UpstreamUnavailable { timed_out, message } => {
                let status = if *timed_out {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, "upstream_unavailable", Some(message.clone()))
            }
            AppError::StoreUnavailable(msg) => {
                tracing::warn!(error = %msg, "Revocation store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
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
