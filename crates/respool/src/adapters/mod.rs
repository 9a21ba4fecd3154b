//! Resource-kind adapters

mod broker;
mod document;
mod kv;
#[cfg(feature = "mysql")]
mod sql;

pub use broker::{
    Balancer, BrokerAdapter, BrokerConfig, BrokerEndpoints, READER_MAX_BYTES, READER_MIN_BYTES,
    ReaderConfig, WriterConfig,
};
pub use document::{DocumentAdapter, DocumentClient, DocumentDriver, DocumentPoolConfig};
pub use kv::{MemoryKvAdapter, MemoryKvConfig};

#[cfg(feature = "redis")]
pub use kv::{RedisAdapter, RedisPoolConfig};

#[cfg(feature = "mysql")]
pub use sql::{PRIMARY, REPLICA, SqlAdapter, SqlPoolConfig};
