//! Message broker endpoint adapter

use async_trait::async_trait;
use serde::Deserialize;

use respool_core::{Error, PoolKey, Result};

use crate::pool::{ResourceAdapter, RolePolicy};

/// Smallest fetch a reader waits for, in bytes
pub const READER_MIN_BYTES: usize = 10_000;
/// Largest fetch a reader accepts, in bytes
pub const READER_MAX_BYTES: usize = 10_000_000;

/// Comma-separated broker list at `[service, "kafka", name, topic]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BrokerConfig(pub String);

/// Partition selection for produced messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balancer {
    /// Send to the partition that has received the fewest bytes
    LeastBytes,
}

/// Settings for a producer on one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub balancer: Balancer,
    /// Fire and forget, without waiting for acknowledgement
    pub async_writes: bool,
}

/// Settings for a consumer-group member on one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub min_bytes: usize,
    pub max_bytes: usize,
}

/// Resolved brokers for one `(name, topic)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoints {
    pub brokers: Vec<String>,
    pub topic: String,
}

impl BrokerEndpoints {
    /// Producer settings for this topic
    pub fn writer_config(&self, async_writes: bool) -> WriterConfig {
        WriterConfig {
            brokers: self.brokers.clone(),
            topic: self.topic.clone(),
            balancer: Balancer::LeastBytes,
            async_writes,
        }
    }

    /// Consumer settings for this topic and group
    pub fn reader_config(&self, group_id: impl Into<String>) -> ReaderConfig {
        ReaderConfig {
            brokers: self.brokers.clone(),
            topic: self.topic.clone(),
            group_id: group_id.into(),
            min_bytes: READER_MIN_BYTES,
            max_bytes: READER_MAX_BYTES,
        }
    }
}

/// Resolves [`BrokerEndpoints`]; the key's role is the topic
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerAdapter;

#[async_trait]
impl ResourceAdapter for BrokerAdapter {
    type Config = BrokerConfig;
    type Handle = BrokerEndpoints;

    const KIND: &'static str = "kafka";
    const SECTION: &'static str = "kafka";
    const ROLE: RolePolicy = RolePolicy::Required;

    async fn connect(&self, key: &PoolKey, config: &BrokerConfig) -> Result<BrokerEndpoints> {
        let brokers: Vec<String> = config
            .0
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect();
        if brokers.is_empty() {
            return Err(Error::construction(key, "empty broker list"));
        }

        Ok(BrokerEndpoints {
            brokers,
            topic: key.role.clone().unwrap_or_default(),
        })
    }

    async fn close(&self, _handle: &BrokerEndpoints) -> Result<()> {
        Ok(())
    }

    fn describe(config: &BrokerConfig) -> String {
        format!("brokers={}", config.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PoolKey {
        PoolKey::new("orders", "events").with_role("order-created")
    }

    #[tokio::test]
    async fn test_split_brokers() {
        let config: BrokerConfig =
            serde_json::from_value(serde_json::json!("k1:9092, k2:9092,,k3:9092")).unwrap();
        let endpoints = BrokerAdapter.connect(&key(), &config).await.unwrap();

        assert_eq!(endpoints.brokers, vec!["k1:9092", "k2:9092", "k3:9092"]);
        assert_eq!(endpoints.topic, "order-created");
    }

    #[tokio::test]
    async fn test_empty_broker_list() {
        let err = BrokerAdapter
            .connect(&key(), &BrokerConfig(" , ".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Construction { .. }));
    }

    #[test]
    fn test_reader_and_writer_config() {
        let endpoints = BrokerEndpoints {
            brokers: vec!["k1:9092".to_string()],
            topic: "order-created".to_string(),
        };

        let writer = endpoints.writer_config(true);
        assert_eq!(writer.balancer, Balancer::LeastBytes);
        assert!(writer.async_writes);

        let reader = endpoints.reader_config("billing");
        assert_eq!(reader.group_id, "billing");
        assert_eq!(reader.min_bytes, 10_000);
        assert_eq!(reader.max_bytes, 10_000_000);
    }
}
