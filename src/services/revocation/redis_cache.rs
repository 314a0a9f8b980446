// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Redis-backed cache client.

use async_trait::async_trait;
use std::time::Duration;

use super::cache::{CacheClient, CacheError, CacheResult};

/// Keys fetched per SCAN round trip when counting.
const SCAN_BATCH: u32 = 500;

/// Redis cache client over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Connect to a URL like `redis://localhost:6379`.
    ///
    /// Fails if the server cannot be reached now; later outages are retried
    /// by the connection manager.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();

        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        let ttl_seconds: u64 = ttl.as_secs().max(1);

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.manager.clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))
    }

    async fn count_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);

        let mut cursor: u64 = 0;
        let mut total: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::BackendCommand(e.to_string()))?;

            total += keys.len() as u64;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(total)
    }
}
