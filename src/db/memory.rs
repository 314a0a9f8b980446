// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory implementation of the storage traits.
//!
//! Mirrors the Firestore layout (active slots keyed by pair, revoked grants
//! keyed by id) so ledger behavior is identical across backends.

use crate::db::{AuditStore, AuthorizationStore, ServiceDirectory};
use crate::error::AppError;
use crate::models::authorization::active_slot_id;
use crate::models::{Authorization, ProxyAuditRecord, ServiceDescriptor};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    active: DashMap<String, Authorization>,
    revoked: DashMap<String, Authorization>,
    audits: DashMap<String, ProxyAuditRecord>,
    services: DashMap<String, ServiceDescriptor>,
    failing: AtomicBool,
}

/// In-memory database. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service in the directory.
    pub fn insert_service(&self, service: ServiceDescriptor) {
        self.inner.services.insert(service.id.clone(), service);
    }

    /// Make every subsequent operation fail with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of stored audit records, oldest first.
    pub fn audit_records(&self) -> Vec<ProxyAuditRecord> {
        let mut records: Vec<_> = self
            .inner
            .audits
            .iter()
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        records
    }

    /// Number of active grants across all users.
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    fn check(&self) -> Result<(), AppError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(AppError::Database("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorizationStore for MemoryDb {
    async fn find_active(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<Authorization>, AppError> {
        self.check()?;
        Ok(self
            .inner
            .active
            .get(&active_slot_id(user_id, service_id))
            .map(|a| a.value().clone()))
    }

    async fn save_active(&self, auth: &Authorization) -> Result<(), AppError> {
        self.check()?;
        self.inner.active.insert(auth.slot_id(), auth.clone());
        Ok(())
    }

    async fn archive_revoked(&self, auth: &Authorization) -> Result<(), AppError> {
        self.check()?;
        self.inner.active.remove(&auth.slot_id());
        self.inner.revoked.insert(auth.id.clone(), auth.clone());
        Ok(())
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Authorization>, AppError> {
        self.check()?;
        let mut grants: Vec<Authorization> = self
            .inner
            .active
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.value().clone())
            .collect();
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grants)
    }

    async fn list_active_expired(&self, now: &str) -> Result<Vec<Authorization>, AppError> {
        self.check()?;
        Ok(self
            .inner
            .active
            .iter()
            .filter(|a| a.expires_at.as_str() < now)
            .map(|a| a.value().clone())
            .collect())
    }

    async fn touch_last_used(
        &self,
        user_id: &str,
        service_id: &str,
        at: &str,
    ) -> Result<bool, AppError> {
        self.check()?;
        match self
            .inner
            .active
            .get_mut(&active_slot_id(user_id, service_id))
        {
            Some(mut auth) => {
                auth.last_used_at = Some(at.to_string());
                auth.updated_at = at.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_revoked_for_user(&self, user_id: &str) -> Result<Vec<Authorization>, AppError> {
        self.check()?;
        let mut grants: Vec<Authorization> = self
            .inner
            .revoked
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.value().clone())
            .collect();
        grants.sort_by(|a, b| b.revoked_at.cmp(&a.revoked_at));
        Ok(grants)
    }
}

#[async_trait]
impl AuditStore for MemoryDb {
    async fn insert_audit(&self, record: &ProxyAuditRecord) -> Result<(), AppError> {
        self.check()?;
        self.inner.audits.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn purge_audit_before(&self, cutoff: &str) -> Result<usize, AppError> {
        self.check()?;
        let before = self.inner.audits.len();
        self.inner
            .audits
            .retain(|_, r| r.timestamp.as_str() >= cutoff);
        Ok(before - self.inner.audits.len())
    }
}

#[async_trait]
impl ServiceDirectory for MemoryDb {
    async fn find_service(
        &self,
        id_or_slug: &str,
    ) -> Result<Option<ServiceDescriptor>, AppError> {
        self.check()?;
        if let Some(service) = self.inner.services.get(id_or_slug) {
            return Ok(Some(service.value().clone()));
        }
        let slug = id_or_slug.to_lowercase();
        Ok(self
            .inner
            .services
            .iter()
            .find(|s| s.slug == slug)
            .map(|s| s.value().clone()))
    }

    async fn find_service_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<ServiceDescriptor>, AppError> {
        self.check()?;
        Ok(self
            .inner
            .services
            .iter()
            .find(|s| s.enabled && s.api_key_matches(api_key))
            .map(|s| s.value().clone()))
    }
}
