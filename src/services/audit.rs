// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fire-and-forget persistence of proxy audit records.

use crate::db::AuditStore;
use crate::models::audit::AUDIT_RETENTION_DAYS;
use crate::models::ProxyAuditRecord;
use crate::time_utils::format_utc_rfc3339;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Persist `record` on a background task. Never blocks the caller and
    /// never reports failure back; exhausted retries are logged.
    pub fn submit(&self, record: ProxyAuditRecord) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut backoff = std::time::Duration::from_millis(INITIAL_BACKOFF_MS);
            for attempt in 1..=MAX_ATTEMPTS {
                match store.insert_audit(&record).await {
                    Ok(()) => return,
                    Err(e) if attempt < MAX_ATTEMPTS => {
                        tracing::debug!(attempt, error = %e, "Audit write failed, retrying");
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                    Err(e) => {
                        tracing::error!(
                            user_id = %record.user_id,
                            service_id = %record.service_id,
                            endpoint = %record.endpoint,
                            error = %e,
                            "Dropping proxy audit record"
                        );
                    }
                }
            }
        })
    }

    /// Delete records older than the retention window.
    pub async fn purge_expired(&self) -> crate::error::Result<usize> {
        let cutoff = format_utc_rfc3339(Utc::now() - Duration::days(AUDIT_RETENTION_DAYS));
        self.store.purge_audit_before(&cutoff).await
    }
}
