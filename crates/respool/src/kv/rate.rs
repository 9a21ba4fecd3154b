//! Fixed-window rate limiting on a pooled key-value store

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use respool_core::{Error, PoolKey, RemoteStore, Result};

use crate::pool::{ResourceAdapter, ResourcePool};

/// Outcome of one [`RateLimiter::allow`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Calls counted in the current window, this one included
    pub count: i64,
    /// Time until the window resets; zero when allowed
    pub delay: Duration,
    pub allowed: bool,
}

/// Counts calls per key in fixed windows aligned to the Unix epoch
///
/// The counter for a window lives under `"{key}:{window index}"` in the
/// store pooled as `pool_key` and expires with the window, so every
/// process sharing the store shares the limit.
pub struct RateLimiter<A>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
{
    pool: ResourcePool<A>,
}

impl<A> RateLimiter<A>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
{
    pub fn new(pool: ResourcePool<A>) -> Self {
        Self { pool }
    }

    /// Count a call against `key`, allowing at most `max` per `window`
    pub async fn allow(
        &self,
        pool_key: impl Into<PoolKey>,
        key: &str,
        window: Duration,
        max: i64,
    ) -> Result<RateDecision> {
        self.allow_at(pool_key, key, window, max, SystemTime::now())
            .await
    }

    /// [`allow`](Self::allow) against an explicit wall clock reading
    pub async fn allow_at(
        &self,
        pool_key: impl Into<PoolKey>,
        key: &str,
        window: Duration,
        max: i64,
        now: SystemTime,
    ) -> Result<RateDecision> {
        let window_ms = window.as_millis();
        if window_ms == 0 {
            return Err(Error::Usage("rate window must be at least 1ms".to_string()));
        }

        let now_ms = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let index = now_ms / window_ms;
        let counter = format!("{key}:{index}");

        let store = self.pool.acquire(pool_key).await?;
        let count = store.incr(&counter).await?;
        if count == 1 {
            store.expire(&counter, window).await?;
        }

        if count <= max {
            return Ok(RateDecision {
                count,
                delay: Duration::ZERO,
                allowed: true,
            });
        }

        let remaining = (index + 1) * window_ms - now_ms;
        let delay = Duration::from_millis(u64::try_from(remaining).unwrap_or(u64::MAX));
        debug!(key = %key, count, max, delay = ?delay, "rate limit exceeded");
        Ok(RateDecision {
            count,
            delay,
            allowed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryKvAdapter;
    use crate::pool::PoolManager;
    use crate::source::MemoryConfigSource;
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> PoolManager {
        PoolManager::new(Arc::new(MemoryConfigSource::new(json!({
            "edge": { "memory_kv": { "limits": {} } }
        }))))
    }

    fn at(millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    #[tokio::test]
    async fn test_limit_within_window() {
        let manager = manager();
        let limiter = RateLimiter::new(manager.pool(MemoryKvAdapter));
        let window = Duration::from_secs(10);

        for count in 1..=3 {
            let decision = limiter
                .allow_at(("edge", "limits"), "login:7", window, 3, at(61_000))
                .await
                .unwrap();
            assert_eq!(decision.count, count);
            assert!(decision.allowed);
            assert_eq!(decision.delay, Duration::ZERO);
        }

        let denied = limiter
            .allow_at(("edge", "limits"), "login:7", window, 3, at(62_500))
            .await
            .unwrap();
        assert_eq!(denied.count, 4);
        assert!(!denied.allowed);
        assert_eq!(denied.delay, Duration::from_millis(7_500));

        // Next window starts over
        let fresh = limiter
            .allow_at(("edge", "limits"), "login:7", window, 3, at(70_000))
            .await
            .unwrap();
        assert_eq!(fresh.count, 1);
        assert!(fresh.allowed);

        // Other keys are counted apart
        let other = limiter
            .allow_at(("edge", "limits"), "login:8", window, 3, at(62_500))
            .await
            .unwrap();
        assert_eq!(other.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_counter_expires() {
        let manager = manager();
        let pool = manager.pool(MemoryKvAdapter);
        let limiter = RateLimiter::new(pool.clone());

        limiter
            .allow_at(("edge", "limits"), "api", Duration::from_secs(1), 5, at(3_000))
            .await
            .unwrap();
        let store = pool.acquire(("edge", "limits")).await.unwrap();
        assert_eq!(store.get_num("api:3").await.unwrap(), Some(1));

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert_eq!(store.get_num("api:3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_window_rejected() {
        let manager = manager();
        let limiter = RateLimiter::new(manager.pool(MemoryKvAdapter));

        let err = limiter
            .allow(("edge", "limits"), "api", Duration::ZERO, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
