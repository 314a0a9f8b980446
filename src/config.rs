// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment and read
//! once at startup. The hub refuses to start if any of them is missing.

use std::env;

/// Minimum length for the service HMAC secret.
const MIN_HMAC_SECRET_LEN: usize = 32;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Portal URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Redis URL for the revocation cache. Unset means revocation runs fail-open.
    pub redis_url: Option<String>,
    /// Hub name used in injected `X-{hub}-*` headers
    pub hub_name: String,
    /// Hard timeout for proxied calls, in seconds
    pub proxy_timeout_secs: u64,
    /// Interval between expiry sweeps, in seconds (0 disables the sweeper)
    pub sweep_interval_secs: u64,
    /// Service callback requests allowed per minute per API key
    pub callback_rate_limit_per_min: u32,

    // --- Secrets ---
    /// JWT signing key for portal session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Secret used to derive per-service identity keys
    pub identity_secret: String,
    /// Shared secret for signing forwarded identity headers
    pub service_hmac_secret: String,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            redis_url: None,
            hub_name: "Sorikama".to_string(),
            proxy_timeout_secs: 30,
            sweep_interval_secs: 0,
            callback_rate_limit_per_min: 100,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            identity_secret: "test-identity-secret".to_string(),
            service_hmac_secret: "test-service-hmac-secret-at-least-32-chars".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let service_hmac_secret = required("SERVICE_HMAC_SECRET")?;
        if service_hmac_secret.len() < MIN_HMAC_SECRET_LEN {
            return Err(ConfigError::Invalid(
                "SERVICE_HMAC_SECRET",
                format!("must be at least {} characters", MIN_HMAC_SECRET_LEN),
            ));
        }

        let callback_rate_limit_per_min = parse_or("CALLBACK_RATE_LIMIT_PER_MIN", 100);
        if callback_rate_limit_per_min == 0 {
            return Err(ConfigError::Invalid(
                "CALLBACK_RATE_LIMIT_PER_MIN",
                "must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080),
            redis_url: env::var("REDIS_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            hub_name: env::var("HUB_NAME").unwrap_or_else(|_| "Sorikama".to_string()),
            proxy_timeout_secs: parse_or("PROXY_TIMEOUT_SECS", 30),
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", 3600),
            callback_rate_limit_per_min,

            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            identity_secret: required("USER_ENCRYPTION_SECRET")?,
            service_hmac_secret,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
