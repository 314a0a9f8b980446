// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Endpoints called by registered services.
//!
//! Every request carries the service's API key and the encrypted user id
//! the hub forwarded earlier; `require_service_key` resolves both before
//! these handlers run.

use crate::error::{AppError, Result};
use crate::middleware::service_auth::ServiceCaller;
use crate::models::RevokedBy;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/service-callback/logout", post(service_logout))
        .route(
            "/api/v1/service-callback/session-activity",
            post(session_activity),
        )
        .route(
            "/api/v1/service-callback/verify-authorization",
            get(verify_authorization),
        )
        .route("/api/v1/service-callback/verify-session", post(verify_session))
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<usize>,
}

pub const DEFAULT_SERVICE_LOGOUT_REASON: &str = "Logged out from service";

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ServiceLogoutRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: Option<String>,
}

/// The user logged out of the service; end the grant.
///
/// The body is optional. An empty body records the default reason.
async fn service_logout(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<ServiceCaller>,
    body: Bytes,
) -> Result<Json<CallbackResponse>> {
    let request: ServiceLogoutRequest = if body.is_empty() {
        ServiceLogoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let reason = request
        .reason
        .as_deref()
        .unwrap_or(DEFAULT_SERVICE_LOGOUT_REASON);
    let revoked = state
        .ledger
        .revoke(
            &caller.user_id,
            &caller.service.id,
            reason,
            RevokedBy::Service,
            None,
        )
        .await?;

    Ok(Json(CallbackResponse {
        success: true,
        revoked: Some(revoked),
    }))
}

async fn session_activity(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<ServiceCaller>,
) -> Json<CallbackResponse> {
    state
        .ledger
        .touch_last_used(&caller.user_id, &caller.service.id)
        .await;

    Json(CallbackResponse {
        success: true,
        revoked: None,
    })
}

#[derive(Debug, Serialize)]
pub struct VerifyAuthorizationResponse {
    pub authorized: bool,
    pub user_hash: String,
}

async fn verify_authorization(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<ServiceCaller>,
) -> Result<Json<VerifyAuthorizationResponse>> {
    let authorized = state
        .ledger
        .has_active(&caller.user_id, &caller.service.id)
        .await?;

    Ok(Json(VerifyAuthorizationResponse {
        authorized,
        user_hash: state
            .identity
            .hash_user_id(&caller.user_id, &caller.service.id),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifySessionRequest {
    #[validate(length(min = 1, max = 4096))]
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifySessionResponse {
    pub valid: bool,
    /// Unix milliseconds
    pub expires_at: i64,
}

async fn verify_session(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<ServiceCaller>,
    Json(request): Json<VerifySessionRequest>,
) -> Result<Json<VerifySessionResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let claims = state
        .identity
        .verify_session_token(&request.session_token, &caller.service.id)?;

    if claims.user_id != caller.user_id {
        tracing::warn!(
            service_id = %caller.service.id,
            "Session token presented for a different user"
        );
        return Err(AppError::Forbidden(
            "Session token does not belong to this user".to_string(),
        ));
    }

    Ok(Json(VerifySessionResponse {
        valid: true,
        expires_at: claims.expires_at_ms,
    }))
}
