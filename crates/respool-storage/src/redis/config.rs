//! Configuration for the Redis store

use std::time::Duration;

/// Connection and behavior settings for [`RedisRemoteStore`](super::RedisRemoteStore)
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Server addresses: cluster seed nodes, or standalone servers tried
    /// in order until one answers PING
    pub addrs: Vec<String>,

    /// Talk to a Redis Cluster; unset means cluster when more than one
    /// address is given
    pub cluster: Option<bool>,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// Idle connections the pool keeps open
    pub min_idle: Option<u32>,

    /// Time allowed to establish a connection
    pub connection_timeout: Duration,

    /// Upper bound on a single command round trip
    pub command_timeout: Option<Duration>,

    /// Connections older than this are recycled
    pub max_lifetime: Option<Duration>,

    /// Extra attempts when checking a connection out of the pool
    pub max_retries: u32,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            addrs: vec!["127.0.0.1:6379".to_string()],
            cluster: None,
            pool_size: 10,
            min_idle: None,
            connection_timeout: Duration::from_secs(5),
            command_timeout: None,
            max_lifetime: None,
            max_retries: 0,
        }
    }
}

impl RedisStoreConfig {
    /// Create new config for a list of addresses
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addrs: addrs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set pool size
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Force cluster or standalone mode
    pub fn cluster(mut self, cluster: bool) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Whether to connect with the cluster client
    pub fn is_cluster(&self) -> bool {
        self.cluster.unwrap_or(self.addrs.len() > 1)
    }

    /// Set the per-command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Connection URLs, accepting bare `host:port` entries
    pub fn urls(&self) -> Vec<String> {
        self.addrs
            .iter()
            .map(|addr| {
                if addr.contains("://") {
                    addr.clone()
                } else {
                    format!("redis://{addr}")
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = RedisStoreConfig::new(["10.0.0.1:6379", "rediss://cache.internal:6380"]);
        assert_eq!(
            config.urls(),
            vec![
                "redis://10.0.0.1:6379".to_string(),
                "rediss://cache.internal:6380".to_string()
            ]
        );
    }

    #[test]
    fn test_builder() {
        let config = RedisStoreConfig::default()
            .pool_size(32)
            .command_timeout(Duration::from_millis(250));
        assert_eq!(config.pool_size, 32);
        assert_eq!(config.command_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_cluster_mode() {
        assert!(!RedisStoreConfig::new(["a:6379"]).is_cluster());
        assert!(RedisStoreConfig::new(["a:6379", "b:6379"]).is_cluster());
        assert!(!RedisStoreConfig::new(["a:6379", "b:6379"]).cluster(false).is_cluster());
        assert!(RedisStoreConfig::new(["a:6379"]).cluster(true).is_cluster());
    }
}
