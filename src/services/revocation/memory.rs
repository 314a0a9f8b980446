// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process TTL cache for tests and single-instance development.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cache::{CacheClient, CacheResult};

/// In-memory cache with per-key deadlines. Expired keys are dropped lazily.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a key, if it is still live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|entry| entry.1.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone());

        if live.is_none() {
            self.entries.remove_if(key, |_, (_, deadline)| *deadline <= now);
        }
        Ok(live)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let ttl = ttl.max(Duration::from_secs(1));
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        Ok(self.entries.remove(key).map(|_| 1).unwrap_or(0))
    }

    async fn count_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let now = Instant::now();
        self.entries.retain(|_, (_, deadline)| *deadline > now);
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .count() as u64)
    }
}
