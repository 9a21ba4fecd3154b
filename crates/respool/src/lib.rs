//! respool: Config-reactive resource pools and a tiered cache
//!
//! # Features
//!
//! - **Keyed handle pools** shared per `(service, name[, role])`
//! - **Hot reload** from a watched configuration tree, with graceful drain
//! - **Adapters** for key-value stores, SQL clusters, document stores and brokers
//! - **Tiered cache** (local + pooled remote) with pluggable serialization
//! - **Rate limiting and id sequences** on pooled key-value stores
//! - **Metrics integration**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use respool::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(MemoryConfigSource::new(serde_json::json!({
//!         "orders": { "memory_kv": { "primary": {} } }
//!     })));
//!     let manager = PoolManager::new(source);
//!     let cache = TieredCache::new(
//!         manager.pool(MemoryKvAdapter),
//!         MemoryLocalStore::new(MemoryLocalConfig::default()),
//!     );
//!
//!     let orders = cache.scope("orders", "primary");
//!     orders.set("order:42", &"paid", Some(Duration::from_secs(60)), true).await?;
//!
//!     match orders.get::<String>("order:42", true).await? {
//!         CacheResult::Hit(status, tier) => println!("{status} from {tier:?}"),
//!         CacheResult::Miss => println!("rebuild from the database"),
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod kv;
pub mod pool;
pub mod source;

// Re-export core
pub use respool_core::*;

// Re-export storage
pub use respool_storage::{MemoryLocalConfig, MemoryLocalStore, MemoryRemoteStore};

#[cfg(feature = "redis")]
pub use respool_storage::{RedisRemoteStore, RedisStoreConfig};

pub use cache::{CacheScope, TieredCache, TieredCacheConfig};
pub use kv::{IdGenerator, RateDecision, RateLimiter};
pub use pool::{PoolManager, PoolSettings, PrewarmReport, ResourceAdapter, ResourcePool, RolePolicy};
pub use source::{FileConfigSource, MemoryConfigSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BatchGet, BatchReport, CacheKey, CacheResult, CacheTier, ConfigSource, Error,
        IdGenerator, JsonSerializer, LocalStore, PoolKey, PoolManager, PoolSettings,
        RateDecision, RateLimiter, RemoteStore, ResourceAdapter, ResourcePool, Result,
        RolePolicy, Serializer, TieredCache, TieredCacheConfig,
    };

    pub use crate::adapters::{BrokerAdapter, DocumentAdapter, MemoryKvAdapter};
    pub use crate::source::{FileConfigSource, MemoryConfigSource};
    pub use crate::{MemoryLocalConfig, MemoryLocalStore, MemoryRemoteStore};

    #[cfg(feature = "redis")]
    pub use crate::adapters::RedisAdapter;

    #[cfg(feature = "mysql")]
    pub use crate::adapters::SqlAdapter;

    #[cfg(feature = "msgpack")]
    pub use crate::MsgPackSerializer;
}
