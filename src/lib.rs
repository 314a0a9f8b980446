// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sorikama Hub: single sign-on and identity-masking proxy
//!
//! Users sign in once and are proxied to registered external services.
//! Services only ever see a per-service encrypted user id, and access can
//! be revoked per service or across all services at once.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{AuditStore, AuthorizationStore, ServiceDirectory};
use middleware::CallbackRateLimiter;
use services::{AuditRecorder, AuthorizationLedger, IdentityCipher, ProxyRouter, RevocationStore};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: Arc<IdentityCipher>,
    pub revocation: Arc<dyn RevocationStore>,
    pub ledger: Arc<AuthorizationLedger>,
    pub services: Arc<dyn ServiceDirectory>,
    pub proxy: ProxyRouter,
    pub audit: AuditRecorder,
    pub callback_limiter: CallbackRateLimiter,
}

impl AppState {
    /// Wire the services together over the given backends.
    pub fn new(
        config: Config,
        authorizations: Arc<dyn AuthorizationStore>,
        audit_store: Arc<dyn AuditStore>,
        services: Arc<dyn ServiceDirectory>,
        revocation: Arc<dyn RevocationStore>,
    ) -> anyhow::Result<Self> {
        let identity = Arc::new(IdentityCipher::new(&config.identity_secret)?);
        let audit = AuditRecorder::new(audit_store);
        let ledger = Arc::new(AuthorizationLedger::new(
            authorizations,
            Arc::clone(&revocation),
        ));
        let proxy = ProxyRouter::new(&config, Arc::clone(&identity), audit.clone())?;
        let callback_limiter = CallbackRateLimiter::per_minute(config.callback_rate_limit_per_min)?;

        Ok(Self {
            config,
            identity,
            revocation,
            ledger,
            services,
            proxy,
            audit,
            callback_limiter,
        })
    }
}
