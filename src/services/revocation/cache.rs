// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Minimal TTL key-value cache abstraction for the revocation store.

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend connection error: {0}")]
    BackendConnection(String),

    #[error("cache backend command error: {0}")]
    BackendCommand(String),

    #[error("invalid cached value: {0}")]
    InvalidValue(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Operations the revocation store needs from a cache backend.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    fn backend_name(&self) -> &'static str;

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value EX ttl`. TTLs under one second are rounded up.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<u64>;

    /// Count live keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> CacheResult<u64>;
}
