// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing authorization routes (require authentication via JWT).

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AuthorizationView, ClientContext, RevokedBy};
use crate::routes::proxy::resolve_service;
use crate::services::identity::DEFAULT_SESSION_TTL_SECS;
use crate::services::proxy::{client_ip, user_agent};
use crate::services::revocation::BlacklistOutcome;
use crate::AppState;
use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Path, Request, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/authorize/{service}", post(authorize_service))
        .route("/api/v1/authorizations", get(list_authorizations))
        .route("/api/v1/authorizations/{service}", delete(revoke_authorization))
        .route("/api/v1/auth/logout", post(logout))
}

// ─── Authorize ───────────────────────────────────────────────

const MAX_AUTHORIZE_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AuthorizeRequest {
    #[validate(length(min = 1, max = 32))]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub authorization: AuthorizationView,
    /// Short-lived token the service can verify through the callback API
    pub session_token: String,
    pub session_expires_in: u64,
    /// Stable, non-reversible id for this user at this service
    pub user_hash: String,
}

/// Grant (or refresh) access to a service for the calling user.
async fn authorize_service(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(service_ref): Path<String>,
    request: Request,
) -> Result<Json<AuthorizeResponse>> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_AUTHORIZE_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable request body: {}", e)))?;
    let request: AuthorizeRequest = if body.is_empty() {
        AuthorizeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let service = resolve_service(&state, &service_ref, &user.role).await?;

    let peer_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let client = ClientContext {
        ip_address: client_ip(&parts.headers, peer_ip.as_deref()),
        user_agent: user_agent(&parts.headers),
    };

    let auth = state
        .ledger
        .create_or_refresh(&user.user_id, &service.id, &user.token, request.scopes, &client)
        .await?;

    let session_token = state.identity.generate_session_token(
        &user.user_id,
        &service.id,
        DEFAULT_SESSION_TTL_SECS,
    );

    Ok(Json(AuthorizeResponse {
        authorization: AuthorizationView::from(&auth),
        session_token,
        session_expires_in: DEFAULT_SESSION_TTL_SECS,
        user_hash: state.identity.hash_user_id(&user.user_id, &service.id),
    }))
}

// ─── List / Revoke ───────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AuthorizationsResponse {
    pub authorizations: Vec<AuthorizationView>,
}

async fn list_authorizations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AuthorizationsResponse>> {
    let authorizations = state
        .ledger
        .list_active(&user.user_id)
        .await?
        .iter()
        .map(AuthorizationView::from)
        .collect();

    Ok(Json(AuthorizationsResponse { authorizations }))
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub revoked: usize,
}

/// Registry id for a service reference, or the reference itself when the
/// service is no longer registered (its grants can still be revoked).
pub(crate) async fn resolve_service_id(state: &AppState, service_ref: &str) -> Result<String> {
    Ok(state
        .services
        .find_service(service_ref)
        .await?
        .map(|s| s.id)
        .unwrap_or_else(|| service_ref.to_string()))
}

async fn revoke_authorization(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(service_ref): Path<String>,
) -> Result<Json<RevokeResponse>> {
    let service_id = resolve_service_id(&state, &service_ref).await?;

    let revoked = state
        .ledger
        .revoke(
            &user.user_id,
            &service_id,
            "Revoked by user",
            RevokedBy::User,
            None,
        )
        .await?;

    if revoked == 0 {
        return Err(AppError::NotFound(format!(
            "No active authorization for {}",
            service_ref
        )));
    }

    Ok(Json(RevokeResponse {
        success: true,
        revoked,
    }))
}

// ─── Logout ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    /// False when the token was already expired or revocation is disabled
    pub blacklisted: bool,
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<LogoutResponse>> {
    let outcome = state.revocation.blacklist_token(&user.token, "logout").await?;
    tracing::info!(user_id = %user.user_id, outcome = ?outcome, "User logged out");

    Ok(Json(LogoutResponse {
        success: true,
        blacklisted: matches!(outcome, BlacklistOutcome::Blacklisted { .. }),
    }))
}
