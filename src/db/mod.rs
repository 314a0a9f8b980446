// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Firestore is the system of record in production. The in-memory backend
//! implements the same traits for tests and offline development.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{Authorization, ProxyAuditRecord, ServiceDescriptor};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    /// Active grants, keyed by `active_slot_id(user, service)`
    pub const AUTHORIZATIONS: &str = "authorizations";
    /// Revoked grants, keyed by record id
    pub const REVOKED_AUTHORIZATIONS: &str = "revoked_authorizations";
    pub const PROXY_REQUESTS: &str = "proxy_requests";
    pub const SERVICES: &str = "services";
}

/// Durable storage for authorization grants.
///
/// Active grants occupy one slot per user/service pair, so the store itself
/// guarantees at most one active grant per pair.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// The grant currently occupying the pair's active slot.
    async fn find_active(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<Authorization>, AppError>;

    /// Write a grant into its pair's active slot.
    async fn save_active(&self, auth: &Authorization) -> Result<(), AppError>;

    /// Persist a revoked grant and clear its active slot atomically.
    async fn archive_revoked(&self, auth: &Authorization) -> Result<(), AppError>;

    /// Active grants for a user, newest first.
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Authorization>, AppError>;

    /// Active grants whose `expires_at` is before `now` (RFC3339).
    async fn list_active_expired(&self, now: &str) -> Result<Vec<Authorization>, AppError>;

    /// Set `last_used_at` on the pair's active grant. Returns false if none.
    async fn touch_last_used(
        &self,
        user_id: &str,
        service_id: &str,
        at: &str,
    ) -> Result<bool, AppError>;

    async fn list_revoked_for_user(&self, user_id: &str) -> Result<Vec<Authorization>, AppError>;
}

/// Sink for proxy audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit(&self, record: &ProxyAuditRecord) -> Result<(), AppError>;

    /// Delete records with `timestamp` before `cutoff` (RFC3339).
    async fn purge_audit_before(&self, cutoff: &str) -> Result<usize, AppError>;
}

/// Read-only service registry lookups.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Look up a service by id, falling back to slug.
    async fn find_service(&self, id_or_slug: &str)
        -> Result<Option<ServiceDescriptor>, AppError>;

    /// Look up an enabled service by its callback API key.
    async fn find_service_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<ServiceDescriptor>, AppError>;
}
