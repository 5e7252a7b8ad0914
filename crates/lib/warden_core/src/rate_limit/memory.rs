//! In-process [`CounterStore`] for single-instance deployments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::{CounterStore, CounterStoreError};

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Counters in a [`DashMap`]; each call holds the key's shard lock, which
/// makes it atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop expired counters. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.is_live(now));
        before.saturating_sub(self.counters.len())
    }

    /// Spawn a periodic purge task.
    pub fn spawn_purge_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, "purged expired rate-limit counters");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, CounterStoreError> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key)
            .filter(|c| c.is_live(now))
            .map(|c| c.value))
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), CounterStoreError> {
        self.counters.insert(
            key.to_string(),
            Counter {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64, CounterStoreError> {
        Ok(self.bump(key, u64::MAX, None).unwrap_or(u64::MAX))
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        Ok(self.bump(key, u64::MAX, Some(ttl)).unwrap_or(u64::MAX))
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> Result<Option<u64>, CounterStoreError> {
        Ok(self.bump(key, limit, Some(ttl)))
    }
}

impl InMemoryCounterStore {
    /// Read, decide and write under the key's shard lock. A dead or absent
    /// counter restarts at zero with expiry `ttl`.
    fn bump(&self, key: &str, limit: u64, ttl: Option<Duration>) -> Option<u64> {
        let now = Instant::now();
        let fresh = Counter {
            value: 0,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entry = self.counters.entry(key.to_string()).or_insert(fresh);
        if !entry.is_live(now) {
            *entry = fresh;
        }
        if entry.value >= limit {
            return None;
        }
        entry.value += 1;
        Some(entry.value)
    }
}
