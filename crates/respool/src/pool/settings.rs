//! Pool manager settings

use serde::Deserialize;
use std::time::Duration;

/// Tunables shared by every pool of a [`PoolManager`](crate::PoolManager)
///
/// Deserializable so services can keep it next to the rest of their
/// configuration; durations accept strings such as `"10s"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// How long a replaced handle stays usable before it is closed
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// Pause after a failed configuration watch before resuming
    #[serde(with = "humantime_serde")]
    pub watch_backoff: Duration,
    /// Concurrent constructions during prewarm
    pub prewarm_concurrency: usize,
    /// Connections opened per handle during prewarm
    pub prime_connections: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            watch_backoff: Duration::from_secs(1),
            prewarm_concurrency: 4,
            prime_connections: 10,
        }
    }
}

impl PoolSettings {
    /// Set the drain grace period
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the watch error backoff
    pub fn watch_backoff(mut self, backoff: Duration) -> Self {
        self.watch_backoff = backoff;
        self
    }

    /// Set prewarm concurrency (at least 1)
    pub fn prewarm_concurrency(mut self, n: usize) -> Self {
        self.prewarm_concurrency = n.max(1);
        self
    }

    /// Set connections primed per handle
    pub fn prime_connections(mut self, n: usize) -> Self {
        self.prime_connections = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PoolSettings::default();
        assert_eq!(settings.grace_period, Duration::from_secs(10));
        assert_eq!(settings.watch_backoff, Duration::from_secs(1));
        assert_eq!(settings.prewarm_concurrency, 4);
        assert_eq!(settings.prime_connections, 10);
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: PoolSettings =
            serde_json::from_value(serde_json::json!({ "grace_period": "2s" })).unwrap();
        assert_eq!(settings.grace_period, Duration::from_secs(2));
        assert_eq!(settings.prewarm_concurrency, 4);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = serde_json::from_value::<PoolSettings>(serde_json::json!({ "grace": "2s" }));
        assert!(err.is_err());
    }
}
