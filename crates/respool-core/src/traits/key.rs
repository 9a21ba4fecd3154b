//! Cache key trait and implementations

use std::fmt::Display;

/// Trait for types that can be used as cache keys
///
/// The produced string is used verbatim as the remote store key.
pub trait CacheKey: Send + Sync {
    /// Generate the key string
    fn cache_key(&self) -> String;
}

impl CacheKey for String {
    fn cache_key(&self) -> String {
        self.clone()
    }
}

impl CacheKey for &str {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheKey for &String {
    fn cache_key(&self) -> String {
        (*self).clone()
    }
}

// Tuple implementations for composite keys

impl<T1: Display + Send + Sync, T2: Display + Send + Sync> CacheKey for (T1, T2) {
    fn cache_key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

impl<T1: Display + Send + Sync, T2: Display + Send + Sync, T3: Display + Send + Sync> CacheKey
    for (T1, T2, T3)
{
    fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.0, self.1, self.2)
    }
}
