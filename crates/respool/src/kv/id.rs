//! Sequential ids from a shared counter

use tracing::warn;

use respool_core::{Error, PoolKey, RemoteStore, Result};

use crate::pool::{ResourceAdapter, ResourcePool};

const DEFAULT_COUNTER: &str = "id";
const DEFAULT_ATTEMPTS: u32 = 3;

/// Hands out increasing ids from a counter in a pooled store
///
/// Every process pointed at the same `(service, name)` and counter draws
/// from one sequence. Failed draws are retried, three attempts in all by
/// default.
pub struct IdGenerator<A>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
{
    pool: ResourcePool<A>,
    key: PoolKey,
    counter: String,
    attempts: u32,
}

impl<A> IdGenerator<A>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
{
    pub fn new(pool: ResourcePool<A>, key: impl Into<PoolKey>) -> Self {
        Self {
            pool,
            key: key.into(),
            counter: DEFAULT_COUNTER.to_string(),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Draw from `counter` instead of the default `id`
    pub fn counter(mut self, counter: impl Into<String>) -> Self {
        self.counter = counter.into();
        self
    }

    /// Total tries per id, at least one
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Next id in the sequence; the last failure is returned once every
    /// attempt fails
    pub async fn next_id(&self) -> Result<u64> {
        let mut attempt = 1;
        loop {
            match self.draw().await {
                Ok(id) => return Ok(id),
                Err(e) if attempt < self.attempts => {
                    warn!(key = %self.key, counter = %self.counter, attempt, error = %e, "id draw failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn draw(&self) -> Result<u64> {
        let store = self.pool.acquire(self.key.clone()).await?;
        let value = store.incr(&self.counter).await?;
        u64::try_from(value).map_err(|_| {
            Error::Deserialization(format!("counter {} is negative: {value}", self.counter))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryKvAdapter, MemoryKvConfig};
    use crate::pool::{PoolManager, RolePolicy};
    use crate::source::MemoryConfigSource;
    use async_trait::async_trait;
    use respool_storage::MemoryRemoteStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Refuses the first `failures` connections
    #[derive(Clone, Default)]
    struct FlakyAdapter {
        failures: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResourceAdapter for FlakyAdapter {
        type Config = MemoryKvConfig;
        type Handle = MemoryRemoteStore;

        const KIND: &'static str = "flaky_kv";
        const SECTION: &'static str = "memory_kv";
        const ROLE: RolePolicy = RolePolicy::Forbidden;

        async fn connect(&self, key: &PoolKey, config: &MemoryKvConfig) -> Result<MemoryRemoteStore> {
            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(Error::construction(key, "connection refused"));
            }
            Ok(MemoryRemoteStore::new(config.max_entries))
        }

        async fn close(&self, handle: &MemoryRemoteStore) -> Result<()> {
            handle.close();
            Ok(())
        }
    }

    fn manager() -> PoolManager {
        PoolManager::new(Arc::new(MemoryConfigSource::new(json!({
            "ids": { "memory_kv": { "orders": {} } }
        }))))
    }

    #[tokio::test]
    async fn test_sequence() {
        let manager = manager();
        let pool = manager.pool(MemoryKvAdapter);
        let ids = IdGenerator::new(pool.clone(), ("ids", "orders"));

        assert_eq!(ids.next_id().await.unwrap(), 1);
        assert_eq!(ids.next_id().await.unwrap(), 2);

        let invoices = IdGenerator::new(pool, ("ids", "orders")).counter("invoice");
        assert_eq!(invoices.next_id().await.unwrap(), 1);
        assert_eq!(ids.next_id().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retries_until_connected() {
        let manager = manager();
        let adapter = FlakyAdapter::default();
        adapter.failures.store(2, Ordering::SeqCst);

        let ids = IdGenerator::new(manager.pool(adapter.clone()), ("ids", "orders"));
        assert_eq!(ids.next_id().await.unwrap(), 1);
        assert_eq!(adapter.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let manager = manager();
        let adapter = FlakyAdapter::default();
        adapter.failures.store(3, Ordering::SeqCst);

        let ids = IdGenerator::new(manager.pool(adapter.clone()), ("ids", "orders"));
        let err = ids.next_id().await.unwrap_err();
        assert!(matches!(err, Error::Construction { .. }));

        // Refusals are used up, so one attempt is enough now
        let patient = IdGenerator::new(manager.pool(adapter), ("ids", "orders")).attempts(1);
        assert_eq!(patient.next_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_counter_rejected() {
        let manager = manager();
        let pool = manager.pool(MemoryKvAdapter);
        let store = pool.acquire(("ids", "orders")).await.unwrap();
        store.set_num("id", -10, None).await.unwrap();

        let ids = IdGenerator::new(pool, ("ids", "orders"));
        let err = ids.next_id().await.unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
