// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Service authorization grants.
//!
//! One grant links one user to one external service. While active it lives
//! at a document id derived from `(user_id, service_id)`, which makes a
//! second active grant for the same pair impossible. Revocation moves the
//! record to the revoked collection under its own `id`.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};

/// Access grant lifetime.
pub const GRANT_LIFETIME_DAYS: i64 = 30;
/// Refresh window for a new grant.
pub const REFRESH_LIFETIME_DAYS: i64 = 90;

/// Default scopes for a new grant.
pub fn default_scopes() -> Vec<String> {
    vec!["profile".to_string(), "email".to_string()]
}

/// Who ended a grant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RevokedBy {
    User,
    Admin,
    Service,
    System,
}

/// A user's grant to one external service (stored in Firestore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Authorization {
    /// Record id (UUID), stable for the life of the grant
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    /// SHA-256 hex of the bearer credential bound to this grant
    pub access_token_hash: String,
    /// Opaque rotation secret (hex)
    pub refresh_token: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// RFC3339 (UTC, seconds)
    pub expires_at: String,
    pub refresh_expires_at: String,
    pub is_active: bool,
    pub is_revoked: bool,
    #[serde(default)]
    pub revoked_at: Option<String>,
    #[serde(default)]
    pub revoked_reason: Option<String>,
    #[serde(default)]
    pub revoked_by: Option<RevokedBy>,
    /// Admin who performed the revocation, when `revoked_by == Admin`
    #[serde(default)]
    pub revoked_by_admin: Option<String>,
    #[serde(default)]
    pub last_used_at: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Client metadata recorded on a grant.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Authorization {
    /// Build a fresh active grant.
    pub fn new(
        user_id: &str,
        service_id: &str,
        raw_token: &str,
        scopes: Option<Vec<String>>,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> Self {
        let now_str = format_utc_rfc3339(now);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            service_id: service_id.to_string(),
            access_token_hash: hash_token(raw_token),
            refresh_token: generate_refresh_token(),
            scopes: scopes.filter(|s| !s.is_empty()).unwrap_or_else(default_scopes),
            expires_at: format_utc_rfc3339(now + Duration::days(GRANT_LIFETIME_DAYS)),
            refresh_expires_at: format_utc_rfc3339(now + Duration::days(REFRESH_LIFETIME_DAYS)),
            is_active: true,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            revoked_by: None,
            revoked_by_admin: None,
            last_used_at: Some(now_str.clone()),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            created_at: now_str.clone(),
            updated_at: now_str,
        }
    }

    /// Rebind an existing active grant to a new login.
    pub fn refresh(&mut self, raw_token: &str, client: &ClientContext, now: DateTime<Utc>) {
        let now_str = format_utc_rfc3339(now);
        self.access_token_hash = hash_token(raw_token);
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self.last_used_at = Some(now_str.clone());
        self.expires_at = format_utc_rfc3339(now + Duration::days(GRANT_LIFETIME_DAYS));
        self.updated_at = now_str;
    }

    /// Terminal transition to revoked.
    pub fn revoke(
        &mut self,
        reason: &str,
        revoked_by: RevokedBy,
        admin_id: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let now_str = format_utc_rfc3339(now);
        self.is_active = false;
        self.is_revoked = true;
        self.revoked_at = Some(now_str.clone());
        self.revoked_reason = Some(reason.to_string());
        self.revoked_by = Some(revoked_by);
        self.revoked_by_admin = admin_id.map(str::to_string);
        self.updated_at = now_str;
    }

    /// Expiry as a timestamp. Unparseable values count as already expired.
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        parse_utc_rfc3339(&self.expires_at).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Active, not revoked, and not yet expired.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_revoked && self.expires_at_utc() > now
    }

    /// Document id of the active slot for this grant's pair.
    pub fn slot_id(&self) -> String {
        active_slot_id(&self.user_id, &self.service_id)
    }
}

/// Document id for the single active grant of a user/service pair.
pub fn active_slot_id(user_id: &str, service_id: &str) -> String {
    format!(
        "{}:{}",
        urlencoding::encode(user_id),
        urlencoding::encode(service_id)
    )
}

/// SHA-256 hex of a bearer token.
pub fn hash_token(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Grant as shown to its owner. Secrets are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationView {
    pub id: String,
    pub service_id: String,
    pub scopes: Vec<String>,
    pub expires_at: String,
    pub last_used_at: Option<String>,
    pub created_at: String,
}

impl From<&Authorization> for AuthorizationView {
    fn from(auth: &Authorization) -> Self {
        Self {
            id: auth.id.clone(),
            service_id: auth.service_id.clone(),
            scopes: auth.scopes.clone(),
            expires_at: auth.expires_at.clone(),
            last_used_at: auth.last_used_at.clone(),
            created_at: auth.created_at.clone(),
        }
    }
}
