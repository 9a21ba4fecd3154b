//! Telemetry trait for pool and cache observability

use std::time::Duration;

use crate::PoolKey;

/// Cache tier for metrics labeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Process-local store
    Local,
    /// Authoritative remote store
    Remote,
}

impl CacheTier {
    /// Get tier as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Local => "local",
            CacheTier::Remote => "remote",
        }
    }
}

/// Operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Acquire,
    Get,
    Set,
    MultiGet,
    MultiSet,
    Delete,
    Incr,
    Decr,
    Serialize,
    Deserialize,
}

impl Operation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Acquire => "acquire",
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::MultiGet => "mget",
            Operation::MultiSet => "mset",
            Operation::Delete => "delete",
            Operation::Incr => "incr",
            Operation::Decr => "decr",
            Operation::Serialize => "serialize",
            Operation::Deserialize => "deserialize",
        }
    }
}

/// Lifecycle transition of a pool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
    /// A handle was built and registered
    Constructed,
    /// Construction or configuration failed
    ConstructionFailed,
    /// A configuration change retired a live entry
    Reloaded,
    /// A stale or shut down handle was closed
    Closed,
    /// Closing a handle failed
    CloseFailed,
}

impl PoolEvent {
    /// Get event as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEvent::Constructed => "constructed",
            PoolEvent::ConstructionFailed => "construction_failed",
            PoolEvent::Reloaded => "reloaded",
            PoolEvent::Closed => "closed",
            PoolEvent::CloseFailed => "close_failed",
        }
    }
}

/// Trait for pool and cache metrics
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait Metrics: Send + Sync + 'static {
    /// Record a cache hit
    fn record_hit(&self, key: &str, tier: CacheTier);

    /// Record a cache miss
    fn record_miss(&self, key: &str);

    /// Record operation latency
    fn record_latency(&self, operation: Operation, duration: Duration);

    /// Record a pool entry lifecycle transition
    fn record_pool_event(&self, kind: &'static str, key: &PoolKey, event: PoolEvent);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str, _tier: CacheTier) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_latency(&self, _operation: Operation, _duration: Duration) {}

    #[inline]
    fn record_pool_event(&self, _kind: &'static str, _key: &PoolKey, _event: PoolEvent) {}
}

/// Metrics adapter using the `metrics` crate
///
/// # Example
/// ```ignore
/// use respool_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("respool");
/// // Emits: respool_cache_hits_total, respool_pool_events_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl Metrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str, tier: CacheTier) {
        metrics::counter!(self.metric_name("cache_hits_total"), "tier" => tier.as_str())
            .increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("cache_misses_total")).increment(1);
    }

    fn record_latency(&self, operation: Operation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("operation_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_pool_event(&self, kind: &'static str, _key: &PoolKey, event: PoolEvent) {
        metrics::counter!(
            self.metric_name("pool_events_total"),
            "kind" => kind,
            "event" => event.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(CacheTier::Local.as_str(), "local");
        assert_eq!(CacheTier::Remote.as_str(), "remote");
        assert_eq!(Operation::MultiGet.as_str(), "mget");
        assert_eq!(PoolEvent::CloseFailed.as_str(), "close_failed");
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        // Just verify these don't panic
        metrics.record_hit("key", CacheTier::Local);
        metrics.record_miss("key");
        metrics.record_latency(Operation::Get, Duration::from_millis(1));
        metrics.record_pool_event("redis", &PoolKey::new("svc", "main"), PoolEvent::Closed);
    }
}
