// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated pass-through to registered services.
//!
//! Auth and blacklist middleware run first (see routes/mod.rs). The handler
//! then checks, in order: the service exists, is enabled and admits the
//! caller's role; the token was not issued before a revocation of the
//! user/service pair; an active grant exists. Only then is the call forwarded.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::ServiceDescriptor;
use crate::services::{InboundCall, ProxyIdentity};
use crate::AppState;
use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Path, Request, State},
    response::Response,
    routing::any,
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Largest request body accepted for forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/proxy/{service}", any(proxy_service_root))
        .route("/api/v1/proxy/{service}/{*path}", any(proxy_service_path))
}

async fn proxy_service_root(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(service): Path<String>,
    request: Request,
) -> Result<Response> {
    proxy(state, user, service, String::new(), request).await
}

async fn proxy_service_path(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((service, path)): Path<(String, String)>,
    request: Request,
) -> Result<Response> {
    proxy(state, user, service, path, request).await
}

/// Resolve a service reference and check the caller may use it.
pub(crate) async fn resolve_service(
    state: &AppState,
    service_ref: &str,
    role: &str,
) -> Result<ServiceDescriptor> {
    let service = state
        .services
        .find_service(service_ref)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", service_ref)))?;

    if !service.enabled {
        return Err(AppError::ServiceUnavailable(format!(
            "{} is currently disabled",
            service.name
        )));
    }
    if !service.allows_role(role) {
        return Err(AppError::Forbidden(format!(
            "Role {} may not access {}",
            role, service.name
        )));
    }

    Ok(service)
}

async fn proxy(
    state: Arc<AppState>,
    user: AuthUser,
    service_ref: String,
    subpath: String,
    request: Request,
) -> Result<Response> {
    let service = resolve_service(&state, &service_ref, &user.role).await?;

    if state
        .revocation
        .are_user_service_tokens_revoked(&user.user_id, &service.id, user.issued_at)
        .await
    {
        return Err(AppError::TokenRevoked);
    }

    let grant = state
        .ledger
        .active_grant(&user.user_id, &service.id)
        .await?
        .ok_or_else(|| {
            tracing::info!(
                user_id = %user.user_id,
                service_id = %service.id,
                "Proxy call without active authorization"
            );
            AppError::Forbidden(format!("{} has not been authorized", service.name))
        })?;

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable request body: {}", e)))?;
    let peer_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let call = InboundCall {
        method: parts.method,
        subpath,
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        peer_ip,
    };

    let who = ProxyIdentity {
        user_id: &user.user_id,
        role: &user.role,
        session_id: &grant.id,
    };
    let response = state.proxy.forward(call, who, &service).await?;

    state
        .ledger
        .touch_last_used(&user.user_id, &service.id)
        .await;

    Ok(response)
}
