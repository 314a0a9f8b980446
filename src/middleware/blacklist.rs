// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rejects revoked bearer tokens. Runs after `require_auth`.

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub async fn check_token_blacklist(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user_id, token) = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| (u.user_id.clone(), u.token.clone()))
        .ok_or(AppError::Unauthorized)?;

    if state.revocation.is_blacklisted(&token).await {
        tracing::warn!(user_id = %user_id, "Rejected blacklisted token");
        return Err(AppError::TokenRevoked);
    }

    Ok(next.run(request).await)
}
