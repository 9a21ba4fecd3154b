//! respool-storage: Store implementations for respool
//!
//! - [`MemoryLocalStore`]: process-local byte store for the fast tier
//! - [`MemoryRemoteStore`]: in-process stand-in for a remote key-value store
//! - [`RedisRemoteStore`]: bb8-pooled Redis client (feature `redis`)

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "memory")]
pub use memory::{MemoryLocalConfig, MemoryLocalStore, MemoryRemoteStore};

#[cfg(feature = "redis")]
pub use self::redis::{RedisRemoteStore, RedisStoreConfig};
