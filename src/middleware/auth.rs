// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie set by the portal login.
pub const SESSION_COOKIE: &str = "sorikama_token";

pub const ADMIN_ROLE: &str = "admin";

fn default_role() -> String {
    "user".to_string()
}

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (internal user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
    pub email: Option<String>,
    /// Token issue time (Unix seconds)
    pub issued_at: i64,
    /// The raw bearer token, kept for blacklist checks and logout
    pub token: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Pull the session token from the `Authorization` header, else the cookie.
fn extract_token(request: &Request, jar: &CookieJar) -> Option<String> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match bearer {
        Some(token) => Some(token.to_string()),
        None => jar.get(SESSION_COOKIE).map(|c| c.value().to_string()),
    }
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request, &jar).ok_or(AppError::Unauthorized)?;

    let key = DecodingKey::from_secret(&state.config.jwt_signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let claims = decode::<Claims>(&token, &key, &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::Unauthorized
        })?
        .claims;

    if claims.sub.is_empty() {
        return Err(AppError::Unauthorized);
    }

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        email: claims.email,
        issued_at: i64::try_from(claims.iat).unwrap_or(i64::MAX),
        token,
    });

    Ok(next.run(request).await)
}

/// Must run after `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthorized)?;

    if !user.is_admin() {
        tracing::warn!(user_id = %user.user_id, role = %user.role, "Admin route denied");
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_jwt(
    user_id: &str,
    role: &str,
    ttl_secs: usize,
    signing_key: &[u8],
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl_secs,
        role: role.to_string(),
        email: None,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}
