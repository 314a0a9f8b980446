// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authorization lifecycle.
//!
//! Grants move `ACTIVE -> REVOKED` and never back. Every revocation that
//! changes durable state is followed by a user/service marker in the
//! revocation cache so in-flight tokens stop working immediately.

use crate::db::AuthorizationStore;
use crate::error::Result;
use crate::models::{Authorization, ClientContext, RevokedBy};
use crate::services::revocation::RevocationStore;
use crate::time_utils::format_utc_rfc3339;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Max concurrent revocations during a sweep.
const MAX_CONCURRENT_SWEEPS: usize = 10;

/// Reason recorded on grants ended by the sweeper.
pub const EXPIRED_REASON: &str = "expired";

pub struct AuthorizationLedger {
    store: Arc<dyn AuthorizationStore>,
    revocation: Arc<dyn RevocationStore>,
}

impl AuthorizationLedger {
    pub fn new(store: Arc<dyn AuthorizationStore>, revocation: Arc<dyn RevocationStore>) -> Self {
        Self { store, revocation }
    }

    /// Record a login for `(user_id, service_id)`.
    ///
    /// Refreshes the active grant if there is one; otherwise creates a new
    /// grant. A revoked grant is never reused.
    pub async fn create_or_refresh(
        &self,
        user_id: &str,
        service_id: &str,
        raw_token: &str,
        scopes: Option<Vec<String>>,
        client: &ClientContext,
    ) -> Result<Authorization> {
        let now = Utc::now();

        let auth = match self.store.find_active(user_id, service_id).await? {
            Some(mut existing) if !existing.is_revoked => {
                existing.refresh(raw_token, client, now);
                tracing::debug!(user_id, service_id, id = %existing.id, "Refreshing authorization");
                existing
            }
            _ => {
                let created =
                    Authorization::new(user_id, service_id, raw_token, scopes, client, now);
                tracing::info!(user_id, service_id, id = %created.id, "Creating authorization");
                created
            }
        };

        self.store.save_active(&auth).await?;
        Ok(auth)
    }

    /// Revoke the active grant for one pair. Returns how many were revoked.
    pub async fn revoke(
        &self,
        user_id: &str,
        service_id: &str,
        reason: &str,
        revoked_by: RevokedBy,
        admin_id: Option<&str>,
    ) -> Result<usize> {
        let Some(mut auth) = self.store.find_active(user_id, service_id).await? else {
            tracing::debug!(user_id, service_id, "No active authorization to revoke");
            return Ok(0);
        };

        auth.revoke(reason, revoked_by, admin_id, Utc::now());
        self.store.archive_revoked(&auth).await?;

        tracing::info!(
            user_id,
            service_id,
            reason,
            revoked_by = ?revoked_by,
            "Authorization revoked"
        );

        self.fan_out(user_id, service_id, reason).await;
        Ok(1)
    }

    /// Revoke every active grant a user holds.
    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        reason: &str,
        revoked_by: RevokedBy,
        admin_id: Option<&str>,
    ) -> Result<usize> {
        let grants = self.store.list_active_for_user(user_id).await?;
        let now = Utc::now();

        let mut services = BTreeSet::new();
        for mut auth in grants {
            auth.revoke(reason, revoked_by, admin_id, now);
            self.store.archive_revoked(&auth).await?;
            services.insert(auth.service_id);
        }

        for service_id in &services {
            self.fan_out(user_id, service_id, reason).await;
        }

        let count = services.len();
        tracing::info!(user_id, count, reason, revoked_by = ?revoked_by, "Revoked all authorizations");
        Ok(count)
    }

    /// Active grants for a user, newest first.
    pub async fn list_active(&self, user_id: &str) -> Result<Vec<Authorization>> {
        self.store.list_active_for_user(user_id).await
    }

    /// The pair's grant if it is active, unrevoked and unexpired.
    pub async fn active_grant(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<Authorization>> {
        let now = Utc::now();
        Ok(self
            .store
            .find_active(user_id, service_id)
            .await?
            .filter(|auth| auth.is_live_at(now)))
    }

    pub async fn has_active(&self, user_id: &str, service_id: &str) -> Result<bool> {
        Ok(self.active_grant(user_id, service_id).await?.is_some())
    }

    /// Best effort; failures are logged and dropped.
    pub async fn touch_last_used(&self, user_id: &str, service_id: &str) {
        let at = format_utc_rfc3339(Utc::now());
        match self.store.touch_last_used(user_id, service_id, &at).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(user_id, service_id, "No active grant to touch"),
            Err(e) => tracing::warn!(user_id, service_id, error = %e, "Failed to update last_used_at"),
        }
    }

    /// Revoke every active grant past its `expires_at`.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let expired = self
            .store
            .list_active_expired(&format_utc_rfc3339(now))
            .await?;

        if expired.is_empty() {
            return Ok(0);
        }

        let revoked = AtomicUsize::new(0);
        stream::iter(expired)
            .for_each_concurrent(MAX_CONCURRENT_SWEEPS, |mut auth| {
                let revoked = &revoked;
                async move {
                    auth.revoke(EXPIRED_REASON, RevokedBy::System, None, now);
                    match self.store.archive_revoked(&auth).await {
                        Ok(()) => {
                            revoked.fetch_add(1, Ordering::Relaxed);
                            self.fan_out(&auth.user_id, &auth.service_id, EXPIRED_REASON)
                                .await;
                        }
                        Err(e) => tracing::warn!(
                            id = %auth.id,
                            error = %e,
                            "Failed to expire authorization"
                        ),
                    }
                }
            })
            .await;

        let count = revoked.load(Ordering::Relaxed);
        tracing::info!(count, "Swept expired authorizations");
        Ok(count)
    }

    async fn fan_out(&self, user_id: &str, service_id: &str, reason: &str) {
        if let Err(e) = self
            .revocation
            .revoke_user_service_tokens(user_id, service_id, reason)
            .await
        {
            tracing::warn!(
                user_id,
                service_id,
                error = %e,
                "Revocation cache fan-out failed; durable revocation stands"
            );
        }
    }
}
