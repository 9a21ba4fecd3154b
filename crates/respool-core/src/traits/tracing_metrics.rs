use crate::{CacheTier, Metrics, Operation, PoolEvent, PoolKey};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl Metrics for TracingMetrics {
    fn record_hit(&self, key: &str, tier: CacheTier) {
        debug!(
            target: "respool",
            event = "hit",
            key = %key,
            tier = tier.as_str(),
            service = ?self.service_name,
            "Cache Hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "respool",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "Cache Miss"
        );
    }

    fn record_latency(&self, operation: Operation, duration: Duration) {
        tracing::trace!(
            target: "respool",
            event = "latency",
            operation = operation.as_str(),
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "Operation Latency"
        );
    }

    fn record_pool_event(&self, kind: &'static str, key: &PoolKey, event: PoolEvent) {
        match event {
            PoolEvent::ConstructionFailed | PoolEvent::CloseFailed => warn!(
                target: "respool",
                event = event.as_str(),
                kind,
                key = %key,
                service = ?self.service_name,
                "Pool Event"
            ),
            _ => info!(
                target: "respool",
                event = event.as_str(),
                kind,
                key = %key,
                service = ?self.service_name,
                "Pool Event"
            ),
        }
    }
}
