// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, revocation, rate limiting, security headers).

pub mod auth;
pub mod blacklist;
pub mod rate_limit;
pub mod security;
pub mod service_auth;

pub use auth::{require_admin, require_auth, AuthUser};
pub use blacklist::check_token_blacklist;
pub use rate_limit::{limit_callbacks, CallbackRateLimiter};
pub use service_auth::{require_service_key, ServiceCaller};
