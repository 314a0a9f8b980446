// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Service callback authentication middleware.

use crate::error::AppError;
use crate::models::ServiceDescriptor;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-service-api-key";
pub const USER_ID_HEADER: &str = "x-user-id";

/// The registered service a callback came from, plus the internal user id
/// it asked about.
#[derive(Debug, Clone)]
pub struct ServiceCaller {
    pub service: ServiceDescriptor,
    pub user_id: String,
}

/// Require a known service API key and a well-formed encrypted user id.
pub async fn require_service_key(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::warn!("Blocked service callback without API key");
            AppError::Unauthorized
        })?;

    let service = state
        .services
        .find_service_by_api_key(&api_key)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Blocked service callback with unknown API key");
            AppError::Unauthorized
        })?;

    let encrypted_user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", USER_ID_HEADER)))?;

    let user_id = state
        .identity
        .decrypt_user_id(encrypted_user_id, &service.id)
        .inspect_err(|e| {
            tracing::warn!(service_id = %service.id, error = %e, "Undecryptable user id in callback");
        })?;

    tracing::debug!(service_id = %service.id, "Service callback authenticated");

    request
        .extensions_mut()
        .insert(ServiceCaller { service, user_id });

    Ok(next.run(request).await)
}
