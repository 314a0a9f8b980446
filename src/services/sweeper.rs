// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic background maintenance.

use crate::services::audit::AuditRecorder;
use crate::services::ledger::AuthorizationLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_grants: usize,
    pub purged_audit_records: usize,
}

/// Expire stale grants and purge old audit records.
///
/// Each half runs even if the other fails.
pub async fn run_sweep(ledger: &AuthorizationLedger, audit: &AuditRecorder) -> SweepReport {
    let mut report = SweepReport::default();

    match ledger.sweep_expired().await {
        Ok(count) => report.expired_grants = count,
        Err(e) => tracing::error!(error = %e, "Authorization sweep failed"),
    }
    match audit.purge_expired().await {
        Ok(count) => report.purged_audit_records = count,
        Err(e) => tracing::error!(error = %e, "Audit purge failed"),
    }

    report
}

/// Spawn the sweep loop. Returns `None` when `interval_secs` is 0.
pub fn spawn_sweeper(
    ledger: Arc<AuthorizationLedger>,
    audit: AuditRecorder,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Expiry sweeper disabled");
        return None;
    }

    tracing::info!(interval_secs, "Starting expiry sweeper");
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = run_sweep(&ledger, &audit).await;
            tracing::debug!(
                expired_grants = report.expired_grants,
                purged_audit_records = report.purged_audit_records,
                "Sweep complete"
            );
        }
    }))
}
