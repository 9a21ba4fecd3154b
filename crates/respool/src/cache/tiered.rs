//! Tiered cache over a pooled remote store and a local store

use std::sync::Arc;
use std::time::Duration;

use respool_core::{JsonSerializer, LocalStore, Metrics, NoopMetrics, RemoteStore, Serializer};

use crate::pool::{ResourceAdapter, ResourcePool};

use super::scope::CacheScope;

/// Configuration for [`TieredCache`]
#[derive(Debug, Clone, Default)]
pub struct TieredCacheConfig {
    /// Deadline for each remote store call
    pub op_timeout: Option<Duration>,
    /// TTL jitter fraction (0.0 - 1.0) added on writes to spread expiry
    pub ttl_jitter: f64,
}

impl TieredCacheConfig {
    /// Bound every remote call by `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            op_timeout: Some(timeout),
            ..Default::default()
        }
    }

    /// Set TTL jitter, clamped to 0.0 - 1.0
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

/// Read-through / write-through cache of serializable values and counters
///
/// The remote tier is the handle pooled under `(namespace, name)` and is
/// authoritative; the local tier is an optional best-effort copy under
/// `namespace/name/key`. Generic over:
/// - `A`: the adapter whose handles implement [`RemoteStore`]
/// - `L`: the local store
/// - `S`: the serializer (JSON, MessagePack)
/// - `M`: the metrics collector
pub struct TieredCache<A, L, S = JsonSerializer, M = NoopMetrics>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
    L: LocalStore,
    S: Serializer,
    M: Metrics,
{
    pub(super) pool: ResourcePool<A>,
    pub(super) local: Arc<L>,
    pub(super) serializer: S,
    pub(super) metrics: Arc<M>,
    pub(super) config: TieredCacheConfig,
}

impl<A, L> TieredCache<A, L, JsonSerializer, NoopMetrics>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
    L: LocalStore,
{
    /// Create a cache with the JSON serializer and no metrics
    pub fn new(pool: ResourcePool<A>, local: L) -> Self {
        Self::with_config(pool, local, TieredCacheConfig::default())
    }

    /// Create with custom config
    pub fn with_config(pool: ResourcePool<A>, local: L, config: TieredCacheConfig) -> Self {
        Self {
            pool,
            local: Arc::new(local),
            serializer: JsonSerializer,
            metrics: Arc::new(NoopMetrics),
            config,
        }
    }
}

impl<A, L, S, M> TieredCache<A, L, S, M>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
    L: LocalStore,
    S: Serializer,
    M: Metrics,
{
    /// Create a cache with a custom serializer and metrics
    pub fn with_serializer_and_metrics(
        pool: ResourcePool<A>,
        local: L,
        serializer: S,
        metrics: M,
        config: TieredCacheConfig,
    ) -> Self {
        Self {
            pool,
            local: Arc::new(local),
            serializer,
            metrics: Arc::new(metrics),
            config,
        }
    }

    /// Operations on the records of one `(namespace, name)` resource
    pub fn scope(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> CacheScope<'_, A, L, S, M> {
        CacheScope::new(self, namespace.into(), name.into())
    }

    pub fn pool(&self) -> &ResourcePool<A> {
        &self.pool
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    /// Apply TTL jitter to spread expiry of keys written together
    pub(super) fn jittered(&self, ttl: Option<Duration>) -> Option<Duration> {
        let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
        if self.config.ttl_jitter > 0.0 {
            let range = (ttl.as_millis() as f64 * self.config.ttl_jitter) as u64;
            if range > 0 {
                let jitter = rand::random::<u64>() % range;
                return Some(ttl.saturating_add(Duration::from_millis(jitter)));
            }
        }
        Some(ttl)
    }
}

impl<A, L, S, M> Clone for TieredCache<A, L, S, M>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
    L: LocalStore,
    S: Serializer,
    M: Metrics,
{
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            local: Arc::clone(&self.local),
            serializer: self.serializer.clone(),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}
