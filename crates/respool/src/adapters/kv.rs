//! Key-value store adapters

use async_trait::async_trait;
use serde::Deserialize;

use respool_core::{PoolKey, Result};
use respool_storage::MemoryRemoteStore;

use crate::pool::{ResourceAdapter, RolePolicy};

/// Section for an in-process key-value store
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryKvConfig {
    /// Refuse new keys past this many entries
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Builds [`MemoryRemoteStore`] handles from `[service, "memory_kv", name]`
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryKvAdapter;

#[async_trait]
impl ResourceAdapter for MemoryKvAdapter {
    type Config = MemoryKvConfig;
    type Handle = MemoryRemoteStore;

    const KIND: &'static str = "memory_kv";
    const SECTION: &'static str = "memory_kv";
    const ROLE: RolePolicy = RolePolicy::Forbidden;

    async fn connect(&self, _key: &PoolKey, config: &MemoryKvConfig) -> Result<MemoryRemoteStore> {
        Ok(MemoryRemoteStore::new(config.max_entries))
    }

    async fn close(&self, handle: &MemoryRemoteStore) -> Result<()> {
        handle.close();
        Ok(())
    }

    fn describe(config: &MemoryKvConfig) -> String {
        match config.max_entries {
            Some(max) => format!("max_entries={max}"),
            None => "unbounded".to_string(),
        }
    }
}

#[cfg(feature = "redis")]
pub use self::redis::{RedisAdapter, RedisPoolConfig};

#[cfg(feature = "redis")]
mod redis {
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::time::Duration;

    use respool_core::{PoolKey, Result};
    use respool_storage::{RedisRemoteStore, RedisStoreConfig};

    use crate::pool::{ResourceAdapter, RolePolicy};

    fn default_pool_size() -> u32 {
        10
    }

    fn default_dial_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Section for a Redis deployment
    ///
    /// ```json
    /// { "addrs": ["10.0.0.1:6379"], "pool_size": 20, "read_timeout": "500ms" }
    /// ```
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct RedisPoolConfig {
        /// Addresses tried in order
        pub addrs: Vec<String>,
        #[serde(default)]
        pub max_retries: u32,
        #[serde(default = "default_pool_size")]
        pub pool_size: u32,
        #[serde(default)]
        pub min_idle_conns: Option<u32>,
        #[serde(default = "default_dial_timeout", with = "humantime_serde")]
        pub dial_timeout: Duration,
        #[serde(default, with = "humantime_serde")]
        pub read_timeout: Option<Duration>,
        #[serde(default, with = "humantime_serde")]
        pub write_timeout: Option<Duration>,
        #[serde(default, with = "humantime_serde")]
        pub max_conn_age: Option<Duration>,
        /// Cluster client; unset means cluster when more than one address is given
        #[serde(default)]
        pub cluster: Option<bool>,
    }

    impl RedisPoolConfig {
        /// Store settings; one command timeout covers both directions
        pub fn store_config(&self) -> RedisStoreConfig {
            let command_timeout = match (self.read_timeout, self.write_timeout) {
                (Some(read), Some(write)) => Some(read.max(write)),
                (read, write) => read.or(write),
            };
            RedisStoreConfig {
                addrs: self.addrs.clone(),
                pool_size: self.pool_size,
                min_idle: self.min_idle_conns,
                connection_timeout: self.dial_timeout,
                command_timeout,
                max_lifetime: self.max_conn_age,
                max_retries: self.max_retries,
                cluster: self.cluster,
            }
        }
    }

    /// Builds [`RedisRemoteStore`] handles from `[service, "redis", name]`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RedisAdapter;

    #[async_trait]
    impl ResourceAdapter for RedisAdapter {
        type Config = RedisPoolConfig;
        type Handle = RedisRemoteStore;

        const KIND: &'static str = "redis";
        const SECTION: &'static str = "redis";
        const ROLE: RolePolicy = RolePolicy::Forbidden;

        async fn connect(&self, _key: &PoolKey, config: &RedisPoolConfig) -> Result<RedisRemoteStore> {
            RedisRemoteStore::connect(config.store_config()).await
        }

        async fn close(&self, handle: &RedisRemoteStore) -> Result<()> {
            handle.close();
            Ok(())
        }

        async fn prime(&self, handle: &RedisRemoteStore, connections: usize) -> Result<usize> {
            handle.prime(connections).await
        }

        fn describe(config: &RedisPoolConfig) -> String {
            format!(
                "addrs={:?} pool_size={} min_idle={:?} cluster={}",
                config.addrs,
                config.pool_size,
                config.min_idle_conns,
                config.store_config().is_cluster()
            )
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_decode_with_durations() {
            let config: RedisPoolConfig = serde_json::from_value(json!({
                "addrs": ["10.0.0.1:6379"],
                "pool_size": 20,
                "read_timeout": "500ms",
                "write_timeout": "1s",
                "max_conn_age": "30m"
            }))
            .unwrap();

            let store = config.store_config();
            assert_eq!(store.pool_size, 20);
            assert_eq!(store.command_timeout, Some(Duration::from_secs(1)));
            assert_eq!(store.max_lifetime, Some(Duration::from_secs(1800)));
            assert_eq!(store.connection_timeout, Duration::from_secs(5));
        }

        #[test]
        fn test_cluster_selection() {
            let seeds: RedisPoolConfig = serde_json::from_value(json!({
                "addrs": ["10.0.0.1:7000", "10.0.0.2:7000"]
            }))
            .unwrap();
            assert_eq!(seeds.cluster, None);
            assert!(seeds.store_config().is_cluster());

            let failover: RedisPoolConfig = serde_json::from_value(json!({
                "addrs": ["10.0.0.1:6379", "10.0.0.2:6379"],
                "cluster": false
            }))
            .unwrap();
            assert!(!failover.store_config().is_cluster());

            let single: RedisPoolConfig =
                serde_json::from_value(json!({ "addrs": ["10.0.0.1:6379"], "cluster": true }))
                    .unwrap();
            assert!(single.store_config().is_cluster());
            assert!(RedisAdapter::describe(&single).ends_with("cluster=true"));
        }

        #[test]
        fn test_unknown_field_rejected() {
            let result = serde_json::from_value::<RedisPoolConfig>(json!({
                "addrs": ["a:1"],
                "password_file": "/tmp/x"
            }));
            assert!(result.is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respool_core::RemoteStore;
    use serde_json::json;

    #[test]
    fn test_memory_config() {
        let config: MemoryKvConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.max_entries, None);

        let config: MemoryKvConfig = serde_json::from_value(json!({ "max_entries": 5 })).unwrap();
        assert_eq!(MemoryKvAdapter::describe(&config), "max_entries=5");

        assert!(serde_json::from_value::<MemoryKvConfig>(json!({ "size": 5 })).is_err());
    }

    #[tokio::test]
    async fn test_memory_connect_and_close() {
        let key = PoolKey::new("orders", "primary");
        let store = MemoryKvAdapter
            .connect(&key, &MemoryKvConfig::default())
            .await
            .unwrap();
        store.set("k", vec![1], None).await.unwrap();

        MemoryKvAdapter.close(&store).await.unwrap();
        assert!(store.is_closed());
        assert!(store.get("k").await.is_err());
    }
}
