//! Store traits used by the tiered cache

use async_trait::async_trait;
use std::time::Duration;

use crate::Result;

/// Authoritative remote key-value store
///
/// Byte-valued; counters use the store's native integer encoding.
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Get a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value, expiring after `ttl` when given
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment a counter, returning the new value
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Atomically decrement a counter, returning the new value
    async fn decr(&self, key: &str) -> Result<i64>;

    /// Make an existing key expire after `ttl`, returning whether it existed
    ///
    /// A zero `ttl` leaves the key without expiry.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Read a counter, `None` when absent
    async fn get_num(&self, key: &str) -> Result<Option<i64>>;

    /// Write a counter
    async fn set_num(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()>;

    /// Fetch many keys in one round trip
    ///
    /// The result has one slot per input key, in input order.
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>>;
}

/// Best-effort process-local byte store
///
/// Evicts on its own schedule and is never authoritative.
pub trait LocalStore: Send + Sync + 'static {
    /// Get a value, `None` on miss
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}
