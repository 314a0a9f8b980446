// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audit record for proxied calls.

use serde::{Deserialize, Serialize};

/// Audit records older than this are purged.
pub const AUDIT_RETENTION_DAYS: i64 = 30;

/// One proxied call, stored in `proxy_requests`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyAuditRecord {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub method: String,
    pub endpoint: String,
    pub status_code: u16,
    /// Milliseconds from request start to upstream response (or failure)
    pub response_time_ms: u64,
    /// 2xx and 3xx responses
    pub success: bool,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// RFC3339 (UTC, seconds)
    pub timestamp: String,
}

impl ProxyAuditRecord {
    pub fn is_success_status(status: u16) -> bool {
        (200..400).contains(&status)
    }
}
