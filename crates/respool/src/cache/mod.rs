//! Tiered read-through cache

mod scope;
mod tiered;

pub use scope::CacheScope;
pub use tiered::{TieredCache, TieredCacheConfig};
