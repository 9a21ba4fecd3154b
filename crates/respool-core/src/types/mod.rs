//! Core types for pools and caches

mod key;
mod result;
mod stats;

pub use key::{ConfigPath, PoolKey};
pub use result::{BatchGet, BatchReport, CacheResult};
pub use stats::StoreStats;
