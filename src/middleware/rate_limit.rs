// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-caller rate limiting for service callbacks.
//!
//! Callers are keyed by the SHA-256 of their API key, or by client IP when
//! no key is sent. Each key gets a token bucket refilling at the configured
//! per-minute rate with a burst of the same size.

use crate::error::AppError;
use crate::middleware::service_auth::API_KEY_HEADER;
use crate::models::service::hash_api_key;
use crate::services::proxy::client_ip;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Tracked keys before stale buckets are dropped.
const MAX_TRACKED_KEYS: usize = 10_000;

pub struct CallbackRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    per_minute: u32,
}

impl CallbackRateLimiter {
    pub fn per_minute(limit: u32) -> anyhow::Result<Self> {
        let limit = NonZeroU32::new(limit)
            .ok_or_else(|| anyhow::anyhow!("callback rate limit must be > 0"))?;

        Ok(Self {
            limiter: RateLimiter::keyed(Quota::per_minute(limit)),
            per_minute: limit.get(),
        })
    }

    /// Take one request from `key`'s bucket. Returns false when empty.
    pub fn check(&self, key: &str) -> bool {
        if self.limiter.len() > MAX_TRACKED_KEYS {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    pub fn limit_per_minute(&self) -> u32 {
        self.per_minute
    }
}

fn caller_key(request: &Request) -> String {
    if let Some(api_key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|k| !k.is_empty())
    {
        return format!("key:{}", hash_api_key(api_key));
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    format!(
        "ip:{}",
        client_ip(request.headers(), peer.as_deref()).unwrap_or_default()
    )
}

/// Reject callers that exhausted their bucket with 429.
pub async fn limit_callbacks(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = caller_key(&request);

    if !state.callback_limiter.check(&key) {
        tracing::warn!(
            limit_per_minute = state.callback_limiter.limit_per_minute(),
            "Service callback rate limit exceeded"
        );
        return Err(AppError::TooManyRequests);
    }

    Ok(next.run(request).await)
}
