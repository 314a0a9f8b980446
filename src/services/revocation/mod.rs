// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token revocation blacklist.
//!
//! Two kinds of cache entries shadow otherwise-valid credentials:
//!
//! - `blacklist:token:{sha256(token)}` blocks one bearer token until it
//!   would have expired anyway.
//! - `blacklist:user:{user}:service:{service}` blocks every token for a
//!   user/service pair issued at or before the revocation. The marker lives
//!   24 hours; tokens minted after it, e.g. by a later login, pass.
//!
//! The cache is a secondary check. Reads fail open when the backend is
//! unreachable; the authorization ledger stays authoritative.

pub mod cache;
pub mod memory;
pub mod redis_cache;

pub use cache::{CacheClient, CacheError};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use crate::config::Config;
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN_KEY_PREFIX: &str = "blacklist:token:";
pub const USER_SERVICE_KEY_PREFIX: &str = "blacklist:user:";
/// Longest lifetime any token for a user/service pair can have.
pub const USER_SERVICE_REVOCATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    StoreUnavailable(String),
}

impl From<CacheError> for RevocationError {
    fn from(err: CacheError) -> Self {
        RevocationError::StoreUnavailable(err.to_string())
    }
}

/// Result of a blacklist request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistOutcome {
    /// Entry written; it lives until the token would have expired.
    Blacklisted { ttl_secs: u64 },
    /// Token is already past its expiry, nothing to shadow.
    AlreadyExpired,
    /// Revocation is disabled for this process.
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistStats {
    pub total_blacklisted: u64,
    pub total_user_service_markers: u64,
}

/// Value stored under a per-token key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub reason: String,
    pub revoked_at: String,
    pub user_id: Option<String>,
    pub service_id: Option<String>,
    pub expires_at: String,
}

/// Value stored under a user/service marker key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationMarker {
    pub revoked_at: String,
    pub reason: String,
}

/// Revocation capability. Call sites never branch on cache connectivity;
/// the implementation chosen at startup decides.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Shadow a bearer token until its own expiry.
    async fn blacklist_token(
        &self,
        token: &str,
        reason: &str,
    ) -> Result<BlacklistOutcome, RevocationError>;

    /// Fails open: store errors read as "not blacklisted".
    async fn is_blacklisted(&self, token: &str) -> bool;

    async fn remove_from_blacklist(&self, token: &str) -> Result<bool, RevocationError>;

    /// Invalidate every token for a user/service pair issued up to now.
    async fn revoke_user_service_tokens(
        &self,
        user_id: &str,
        service_id: &str,
        reason: &str,
    ) -> Result<(), RevocationError>;

    /// True when a token issued at `issued_at` (Unix seconds) predates a
    /// revocation of the pair. Fails open: store errors read as "not revoked".
    async fn are_user_service_tokens_revoked(
        &self,
        user_id: &str,
        service_id: &str,
        issued_at: i64,
    ) -> bool;

    async fn stats(&self) -> Result<BlacklistStats, RevocationError>;
}

/// Cache key for a bearer token. The raw credential is never stored.
pub fn token_key(token: &str) -> String {
    format!("{}{}", TOKEN_KEY_PREFIX, hex::encode(Sha256::digest(token.as_bytes())))
}

pub fn user_service_key(user_id: &str, service_id: &str) -> String {
    format!(
        "{}{}:service:{}",
        USER_SERVICE_KEY_PREFIX, user_id, service_id
    )
}

/// Claims read from a token without checking its signature.
#[derive(Debug, Deserialize)]
struct PeekedClaims {
    exp: i64,
    sub: Option<String>,
    service: Option<String>,
}

fn peek_claims(token: &str) -> Result<PeekedClaims, RevocationError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    decode::<PeekedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| RevocationError::InvalidToken(format!("Cannot read token claims: {}", e)))
}

/// Revocation store backed by a live cache.
pub struct CachedRevocationStore {
    cache: Arc<dyn CacheClient>,
}

impl CachedRevocationStore {
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RevocationStore for CachedRevocationStore {
    fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    async fn blacklist_token(
        &self,
        token: &str,
        reason: &str,
    ) -> Result<BlacklistOutcome, RevocationError> {
        let claims = peek_claims(token)?;

        let now = Utc::now().timestamp();
        let remaining = claims.exp - now;
        if remaining <= 0 {
            tracing::debug!(reason, "Token already expired, not blacklisting");
            return Ok(BlacklistOutcome::AlreadyExpired);
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .map(format_utc_rfc3339)
            .unwrap_or_default();
        let entry = BlacklistEntry {
            reason: reason.to_string(),
            revoked_at: format_utc_rfc3339(Utc::now()),
            user_id: claims.sub.clone(),
            service_id: claims.service,
            expires_at,
        };
        let value = serde_json::to_string(&entry)
            .map_err(|e| RevocationError::InvalidToken(e.to_string()))?;

        let ttl_secs = remaining as u64;
        self.cache
            .set_with_ttl(&token_key(token), &value, Duration::from_secs(ttl_secs))
            .await?;

        tracing::info!(
            user_id = claims.sub.as_deref().unwrap_or("unknown"),
            reason,
            ttl_secs,
            "Token blacklisted"
        );

        Ok(BlacklistOutcome::Blacklisted { ttl_secs })
    }

    async fn is_blacklisted(&self, token: &str) -> bool {
        match self.cache.get_string(&token_key(token)).await {
            Ok(Some(value)) => {
                match serde_json::from_str::<BlacklistEntry>(&value) {
                    Ok(entry) => tracing::warn!(
                        reason = %entry.reason,
                        revoked_at = %entry.revoked_at,
                        user_id = entry.user_id.as_deref().unwrap_or("unknown"),
                        "Blacklisted token presented"
                    ),
                    Err(_) => tracing::warn!("Blacklisted token presented"),
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Blacklist lookup failed, failing open");
                false
            }
        }
    }

    async fn remove_from_blacklist(&self, token: &str) -> Result<bool, RevocationError> {
        let removed = self.cache.del(&token_key(token)).await? > 0;
        tracing::info!(removed, "Token removed from blacklist");
        Ok(removed)
    }

    async fn revoke_user_service_tokens(
        &self,
        user_id: &str,
        service_id: &str,
        reason: &str,
    ) -> Result<(), RevocationError> {
        let marker = RevocationMarker {
            revoked_at: format_utc_rfc3339(Utc::now()),
            reason: reason.to_string(),
        };
        let value = serde_json::to_string(&marker)
            .map_err(|e| RevocationError::InvalidToken(e.to_string()))?;

        self.cache
            .set_with_ttl(
                &user_service_key(user_id, service_id),
                &value,
                USER_SERVICE_REVOCATION_TTL,
            )
            .await?;

        tracing::warn!(user_id, service_id, reason, "All user/service tokens revoked");
        Ok(())
    }

    async fn are_user_service_tokens_revoked(
        &self,
        user_id: &str,
        service_id: &str,
        issued_at: i64,
    ) -> bool {
        match self
            .cache
            .get_string(&user_service_key(user_id, service_id))
            .await
        {
            Ok(Some(value)) => {
                // An unreadable marker still revokes.
                let revoked_at = serde_json::from_str::<RevocationMarker>(&value)
                    .ok()
                    .and_then(|m| parse_utc_rfc3339(&m.revoked_at))
                    .map(|t| t.timestamp())
                    .unwrap_or(i64::MAX);
                if issued_at > revoked_at {
                    return false;
                }
                tracing::warn!(
                    user_id,
                    service_id,
                    issued_at,
                    revoked_at,
                    "Revoked user/service token presented"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id,
                    service_id,
                    "User/service revocation lookup failed, failing open"
                );
                false
            }
        }
    }

    async fn stats(&self) -> Result<BlacklistStats, RevocationError> {
        Ok(BlacklistStats {
            total_blacklisted: self.cache.count_prefix(TOKEN_KEY_PREFIX).await?,
            total_user_service_markers: self.cache.count_prefix(USER_SERVICE_KEY_PREFIX).await?,
        })
    }
}

/// No-op store used when no cache is configured. Every check passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRevocationStore;

#[async_trait]
impl RevocationStore for DisabledRevocationStore {
    fn backend_name(&self) -> &'static str {
        "disabled"
    }

    async fn blacklist_token(
        &self,
        _token: &str,
        reason: &str,
    ) -> Result<BlacklistOutcome, RevocationError> {
        tracing::debug!(reason, "Revocation cache disabled, blacklist skipped");
        Ok(BlacklistOutcome::Skipped)
    }

    async fn is_blacklisted(&self, _token: &str) -> bool {
        false
    }

    async fn remove_from_blacklist(&self, _token: &str) -> Result<bool, RevocationError> {
        Ok(false)
    }

    async fn revoke_user_service_tokens(
        &self,
        user_id: &str,
        service_id: &str,
        _reason: &str,
    ) -> Result<(), RevocationError> {
        tracing::debug!(
            user_id,
            service_id,
            "Revocation cache disabled, user/service revocation skipped"
        );
        Ok(())
    }

    async fn are_user_service_tokens_revoked(
        &self,
        _user_id: &str,
        _service_id: &str,
        _issued_at: i64,
    ) -> bool {
        false
    }

    async fn stats(&self) -> Result<BlacklistStats, RevocationError> {
        Ok(BlacklistStats::default())
    }
}

/// Pick the revocation store once at startup.
pub async fn build_revocation_store(config: &Config) -> Arc<dyn RevocationStore> {
    let Some(url) = config.redis_url.as_deref() else {
        tracing::warn!("REDIS_URL not set, token revocation cache disabled (fail-open)");
        return Arc::new(DisabledRevocationStore);
    };

    match RedisCache::connect(url).await {
        Ok(cache) => {
            tracing::info!("Connected to Redis revocation cache");
            Arc::new(CachedRevocationStore::new(Arc::new(cache)))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Redis unreachable, token revocation cache disabled (fail-open)"
            );
            Arc::new(DisabledRevocationStore)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token_expiring_in(secs: i64) -> String {
        let now = Utc::now().timestamp();
        encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "u1", "iat": now, "exp": now + secs }),
            &EncodingKey::from_secret(b"any-key"),
        )
        .unwrap()
    }

    /// Issue time of a token minted before any revocation in a test.
    fn earlier() -> i64 {
        Utc::now().timestamp() - 60
    }

    fn live_store() -> (CachedRevocationStore, MemoryCache) {
        let cache = MemoryCache::new();
        (CachedRevocationStore::new(Arc::new(cache.clone())), cache)
    }

    /// Cache that fails every command.
    struct BrokenCache;

    #[async_trait]
    impl CacheClient for BrokenCache {
        fn backend_name(&self) -> &'static str {
            "broken"
        }
        async fn get_string(&self, _key: &str) -> cache::CacheResult<Option<String>> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
        async fn set_with_ttl(&self, _k: &str, _v: &str, _t: Duration) -> cache::CacheResult<()> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
        async fn del(&self, _key: &str) -> cache::CacheResult<u64> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
        async fn count_prefix(&self, _prefix: &str) -> cache::CacheResult<u64> {
            Err(CacheError::BackendConnection("connection refused".into()))
        }
    }

    #[test]
    fn test_token_key_hides_raw_token() {
        let token = token_expiring_in(60);
        let key = token_key(&token);
        assert!(key.starts_with(TOKEN_KEY_PREFIX));
        assert!(!key.contains(&token));
        assert_eq!(key.len(), TOKEN_KEY_PREFIX.len() + 64);
    }

    #[tokio::test]
    async fn test_blacklist_ttl_matches_token_lifetime() {
        let (store, cache) = live_store();
        let token = token_expiring_in(120);

        let outcome = store.blacklist_token(&token, "logout").await.unwrap();
        let BlacklistOutcome::Blacklisted { ttl_secs } = outcome else {
            panic!("expected Blacklisted, got {:?}", outcome);
        };
        assert!((118..=120).contains(&ttl_secs));
        assert!(store.is_blacklisted(&token).await);

        let remaining = cache.ttl(&token_key(&token)).unwrap();
        assert!(remaining <= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_blacklist_entry_expires_with_token() {
        let (store, _) = live_store();
        let token = token_expiring_in(2);

        store.blacklist_token(&token, "logout").await.unwrap();
        assert!(store.is_blacklisted(&token).await);

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert!(!store.is_blacklisted(&token).await);
    }

    #[tokio::test]
    async fn test_expired_token_not_written() {
        let (store, cache) = live_store();
        let token = token_expiring_in(-30);

        let outcome = store.blacklist_token(&token, "logout").await.unwrap();
        assert_eq!(outcome, BlacklistOutcome::AlreadyExpired);
        assert_eq!(cache.count_prefix(TOKEN_KEY_PREFIX).await.unwrap(), 0);
        assert!(!store.is_blacklisted(&token).await);
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let (store, _) = live_store();
        let err = store.blacklist_token("not-a-jwt", "logout").await.unwrap_err();
        assert!(matches!(err, RevocationError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_user_service_marker() {
        let (store, cache) = live_store();
        assert!(!store.are_user_service_tokens_revoked("u1", "svc1", earlier()).await);

        store
            .revoke_user_service_tokens("u1", "svc1", "policy violation")
            .await
            .unwrap();

        assert!(store.are_user_service_tokens_revoked("u1", "svc1", earlier()).await);
        assert!(!store.are_user_service_tokens_revoked("u1", "svc2", earlier()).await);
        assert!(!store.are_user_service_tokens_revoked("u2", "svc1", earlier()).await);

        let ttl = cache.ttl(&user_service_key("u1", "svc1")).unwrap();
        assert!(ttl > Duration::from_secs(23 * 60 * 60));
    }

    #[tokio::test]
    async fn test_user_service_marker_spares_later_tokens() {
        let (store, cache) = live_store();
        store
            .revoke_user_service_tokens("u1", "svc1", "user request")
            .await
            .unwrap();

        let now = Utc::now().timestamp();
        assert!(store.are_user_service_tokens_revoked("u1", "svc1", now - 1).await);
        assert!(!store.are_user_service_tokens_revoked("u1", "svc1", now + 2).await);

        cache
            .set_with_ttl(
                &user_service_key("u1", "svc2"),
                "not json",
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(store.are_user_service_tokens_revoked("u1", "svc2", now + 2).await);
    }

    #[tokio::test]
    async fn test_remove_and_stats() {
        let (store, _) = live_store();
        let a = token_expiring_in(60);
        let b = token_expiring_in(90);
        store.blacklist_token(&a, "logout").await.unwrap();
        store.blacklist_token(&b, "security").await.unwrap();
        store
            .revoke_user_service_tokens("u1", "svc1", "admin")
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_blacklisted, 2);
        assert_eq!(stats.total_user_service_markers, 1);

        assert!(store.remove_from_blacklist(&a).await.unwrap());
        assert!(!store.remove_from_blacklist(&a).await.unwrap());
        assert!(!store.is_blacklisted(&a).await);
        assert_eq!(store.stats().await.unwrap().total_blacklisted, 1);
    }

    #[tokio::test]
    async fn test_broken_cache_fails_open() {
        let store = CachedRevocationStore::new(Arc::new(BrokenCache));
        let token = token_expiring_in(60);

        assert!(!store.is_blacklisted(&token).await);
        assert!(!store.are_user_service_tokens_revoked("u1", "svc1", earlier()).await);
        assert!(matches!(
            store.blacklist_token(&token, "logout").await,
            Err(RevocationError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_store_allows_everything() {
        let store = DisabledRevocationStore;
        let token = token_expiring_in(60);
        assert_eq!(
            store.blacklist_token(&token, "logout").await.unwrap(),
            BlacklistOutcome::Skipped
        );
        assert!(!store.is_blacklisted(&token).await);
        store
            .revoke_user_service_tokens("u1", "svc1", "x")
            .await
            .unwrap();
        assert!(!store.are_user_service_tokens_revoked("u1", "svc1", earlier()).await);
        assert_eq!(store.stats().await.unwrap(), BlacklistStats::default());
    }

    #[tokio::test]
    async fn test_build_without_redis_is_disabled() {
        let config = Config::test_default();
        let store = build_revocation_store(&config).await;
        assert_eq!(store.backend_name(), "disabled");
    }
}
