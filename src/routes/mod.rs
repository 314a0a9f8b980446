// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod admin;
pub mod authorizations;
pub mod callback;
pub mod proxy;

use crate::middleware::{
    check_token_blacklist, limit_callbacks, require_admin, require_auth, require_service_key,
};
use crate::AppState;
use axum::http::{header, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
    pub revocation_backend: &'static str,
}

/// Health check response
async fn health_check(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
        revocation_backend: state.revocation.backend_name(),
    })
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from the portal and localhost (for dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(health_check));

    // Service callbacks: rate limit, then API key + encrypted user id
    let callback_routes = callback::routes()
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_service_key,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_callbacks));

    // Admin routes. Layers run bottom-up: auth, blacklist, then role check.
    let admin_routes = admin::routes()
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            check_token_blacklist,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // User routes (auth, then blacklist)
    let protected_routes = authorizations::routes()
        .merge(proxy::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            check_token_blacklist,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(callback_routes)
        .merge(admin_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
