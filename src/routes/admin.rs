// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes. Auth, blacklist and admin-role middleware are applied in
//! routes/mod.rs.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::RevokedBy;
use crate::routes::authorizations::{resolve_service_id, RevokeResponse};
use crate::services::revocation::BlacklistStats;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const DEFAULT_ADMIN_REASON: &str = "Revoked by administrator";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/admin/users/{user_id}/authorizations",
            delete(revoke_all_for_user),
        )
        .route(
            "/api/v1/admin/users/{user_id}/authorizations/{service}",
            delete(revoke_for_user),
        )
        .route("/api/v1/admin/blacklist/stats", get(blacklist_stats))
        .route("/api/v1/admin/blacklist/remove", post(remove_from_blacklist))
}

#[derive(Debug, Deserialize)]
struct ReasonQuery {
    reason: Option<String>,
}

impl ReasonQuery {
    fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ADMIN_REASON)
    }
}

async fn revoke_all_for_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Query(query): Query<ReasonQuery>,
) -> Result<Json<RevokeResponse>> {
    tracing::warn!(
        admin_id = %admin.user_id,
        user_id = %user_id,
        "Admin revoking all authorizations"
    );

    let revoked = state
        .ledger
        .revoke_all_for_user(
            &user_id,
            query.reason(),
            RevokedBy::Admin,
            Some(&admin.user_id),
        )
        .await?;

    Ok(Json(RevokeResponse {
        success: true,
        revoked,
    }))
}

async fn revoke_for_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path((user_id, service_ref)): Path<(String, String)>,
    Query(query): Query<ReasonQuery>,
) -> Result<Json<RevokeResponse>> {
    let service_id = resolve_service_id(&state, &service_ref).await?;

    let revoked = state
        .ledger
        .revoke(
            &user_id,
            &service_id,
            query.reason(),
            RevokedBy::Admin,
            Some(&admin.user_id),
        )
        .await?;

    if revoked == 0 {
        return Err(AppError::NotFound(format!(
            "No active authorization for user {} at {}",
            user_id, service_ref
        )));
    }

    Ok(Json(RevokeResponse {
        success: true,
        revoked,
    }))
}

#[derive(Debug, Serialize)]
pub struct BlacklistStatsResponse {
    pub backend: &'static str,
    #[serde(flatten)]
    pub stats: BlacklistStats,
}

async fn blacklist_stats(State(state): State<Arc<AppState>>) -> Result<Json<BlacklistStatsResponse>> {
    Ok(Json(BlacklistStatsResponse {
        backend: state.revocation.backend_name(),
        stats: state.revocation.stats().await?,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemoveFromBlacklistRequest {
    #[validate(length(min = 1, max = 8192))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveFromBlacklistResponse {
    pub removed: bool,
}

async fn remove_from_blacklist(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Json(request): Json<RemoveFromBlacklistRequest>,
) -> Result<Json<RemoveFromBlacklistResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let removed = state.revocation.remove_from_blacklist(&request.token).await?;
    tracing::info!(admin_id = %admin.user_id, removed, "Admin blacklist removal");

    Ok(Json(RemoveFromBlacklistResponse { removed }))
}
