//! Redis remote store

mod config;
mod store;

pub use config::RedisStoreConfig;
pub use store::RedisRemoteStore;
