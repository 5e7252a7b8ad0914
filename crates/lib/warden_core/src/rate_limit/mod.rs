//! Fixed-window rate limiting keyed by `(action, client origin)`.
//!
//! Counters live in a shared [`CounterStore`]. When the store is missing or
//! failing, [`RateLimiter::admit`] lets the request through (fail-open).

pub mod memory;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

pub use memory::InMemoryCounterStore;

/// Action name for account registration.
pub const ACTION_REGISTER: &str = "register";
/// Action name for password login.
pub const ACTION_LOGIN: &str = "login";
/// Action name for refresh-token exchange.
pub const ACTION_REFRESH: &str = "refresh";

/// Counter store errors.
#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Shared integer counters with per-key expiry. Every method is atomic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, or `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, CounterStoreError>;

    /// Set a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration)
    -> Result<(), CounterStoreError>;

    /// Increment and return the new value. An absent key starts from zero
    /// with no expiry.
    async fn increment(&self, key: &str) -> Result<u64, CounterStoreError>;

    /// Increment and return the new value. A key created by this call
    /// (absent or expired) expires after `ttl`; a live key keeps its expiry.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError>;

    /// Increment only while the live value is below `limit`, returning the new
    /// value, or `None` without writing when the value has reached `limit`.
    /// A key created by this call expires after `ttl`.
    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> Result<Option<u64>, CounterStoreError>;
}

/// Limit for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Admission control over a [`CounterStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn CounterStore>>,
}

impl RateLimiter {
    pub fn new(store: Option<Arc<dyn CounterStore>>) -> Self {
        Self { store }
    }

    /// Admit or deny one request for `(action, client_origin)`.
    ///
    /// Grants while the window's count is below `limit`. A denied request
    /// leaves the counter untouched. Store failures admit.
    pub async fn admit(&self, action: &str, client_origin: &str, limit: u64, window: Duration) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        let key = counter_key(action, client_origin);
        match try_admit(store.as_ref(), &key, limit, window).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(action, client_origin, limit, "rate limit exceeded");
                false
            }
            Err(e) => {
                warn!(action, client_origin, error = %e, "rate limit store failed, admitting request");
                true
            }
        }
    }

    /// [`admit`](Self::admit) with a configured rule.
    pub async fn admit_rule(&self, action: &str, client_origin: &str, rule: RateLimitRule) -> bool {
        self.admit(action, client_origin, rule.limit, rule.window).await
    }
}

async fn try_admit(
    store: &dyn CounterStore,
    key: &str,
    limit: u64,
    window: Duration,
) -> Result<bool, CounterStoreError> {
    if limit == 0 {
        return Ok(false);
    }
    Ok(store.increment_below(key, limit, window).await?.is_some())
}

/// Counter key for an `(action, client origin)` pair.
pub fn counter_key(action: &str, client_origin: &str) -> String {
    format!("rate:{action}:{client_origin}")
}

/// Derive the client origin used for bucketing.
///
/// Takes the first entry of an `X-Forwarded-For` value when present, else the
/// peer address. The result is untrusted and only used for throttling.
pub fn client_origin(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Test store that yields to the scheduler before each call, the way a
/// networked store suspends on its round-trip.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct SlowStore {
    inner: InMemoryCounterStore,
}

#[cfg(test)]
#[async_trait]
impl CounterStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, CounterStoreError> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), CounterStoreError> {
        tokio::task::yield_now().await;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn increment(&self, key: &str) -> Result<u64, CounterStoreError> {
        tokio::task::yield_now().await;
        self.inner.increment(key).await
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CounterStoreError> {
        tokio::task::yield_now().await;
        self.inner.increment_with_ttl(key, ttl).await
    }

    async fn increment_below(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> Result<Option<u64>, CounterStoreError> {
        tokio::task::yield_now().await;
        self.inner.increment_below(key, limit, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    /// Store that fails every call.
    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>, CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".into()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".into()))
        }

        async fn increment(&self, _key: &str) -> Result<u64, CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".into()))
        }

        async fn increment_with_ttl(&self, _key: &str, _ttl: Duration) -> Result<u64, CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".into()))
        }

        async fn increment_below(
            &self,
            _key: &str,
            _limit: u64,
            _ttl: Duration,
        ) -> Result<Option<u64>, CounterStoreError> {
            Err(CounterStoreError::Unavailable("connection refused".into()))
        }
    }

    fn limiter() -> (RateLimiter, Arc<InMemoryCounterStore>) {
        let store = Arc::new(InMemoryCounterStore::new());
        (RateLimiter::new(Some(store.clone())), store)
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_window_admits_then_denies_then_resets() {
        let (limiter, _) = limiter();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("login", "10.0.0.1", 3, window).await);
        assert!(limiter.admit("login", "10.0.0.1", 3, window).await);
        assert!(limiter.admit("login", "10.0.0.1", 3, window).await);
        assert!(!limiter.admit("login", "10.0.0.1", 3, window).await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.admit("login", "10.0.0.1", 3, window).await);
    }

    #[tokio::test(start_paused = true)]
    async fn denial_does_not_increment() {
        let (limiter, store) = limiter();
        let window = Duration::from_secs(60);
        for _ in 0..5 {
            limiter.admit("login", "10.0.0.1", 2, window).await;
        }
        let count = store.get(&counter_key("login", "10.0.0.1")).await.unwrap();
        assert_eq!(count, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let (limiter, _) = limiter();
        let window = Duration::from_secs(60);
        assert!(limiter.admit("login", "10.0.0.1", 1, window).await);
        assert!(!limiter.admit("login", "10.0.0.1", 1, window).await);
        assert!(limiter.admit("login", "10.0.0.2", 1, window).await);
        assert!(limiter.admit("register", "10.0.0.1", 1, window).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admissions_never_exceed_limit() {
        let store = Arc::new(SlowStore::default());
        let limiter = RateLimiter::new(Some(store.clone()));

        let calls: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit("login", "10.0.0.1", 3, Duration::from_secs(60)).await })
            })
            .collect();
        let mut admitted = 0;
        for call in calls {
            if call.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(store.get(&counter_key("login", "10.0.0.1")).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn zero_limit_always_denies() {
        let (limiter, _) = limiter();
        assert!(!limiter.admit("login", "o", 0, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn failing_store_fails_open() {
        let limiter = RateLimiter::new(Some(Arc::new(DownStore)));
        for _ in 0..10 {
            assert!(limiter.admit("login", "10.0.0.1", 1, Duration::from_secs(60)).await);
        }
    }

    #[tokio::test]
    async fn missing_store_fails_open() {
        let limiter = RateLimiter::new(None);
        assert!(limiter.admit("login", "10.0.0.1", 1, Duration::from_secs(60)).await);
        assert!(limiter.admit("login", "10.0.0.1", 1, Duration::from_secs(60)).await);
    }

    #[test]
    fn origin_prefers_first_forwarded_entry() {
        let peer = Some(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 9)));
        assert_eq!(client_origin(Some("203.0.113.7, 10.0.0.1"), peer), "203.0.113.7");
        assert_eq!(client_origin(Some("  "), peer), "192.168.0.9");
        assert_eq!(client_origin(None, peer), "192.168.0.9");
        assert_eq!(client_origin(None, None), "unknown");
    }
}
