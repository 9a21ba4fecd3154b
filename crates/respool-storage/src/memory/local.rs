//! Process-local byte store using DashMap

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use respool_core::{Error, LocalStore, Result, StoreStats};

/// Configuration for the local store
#[derive(Debug, Clone)]
pub struct MemoryLocalConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
    /// How long an entry lives after being written
    pub life_window: Duration,
    /// Largest accepted value in bytes (0 = unlimited)
    pub max_entry_size: usize,
}

impl Default for MemoryLocalConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            life_window: Duration::from_secs(600),
            max_entry_size: 1024 * 1024,
        }
    }
}

impl MemoryLocalConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
            ..Default::default()
        }
    }

    /// Set the life window
    pub fn life_window(mut self, window: Duration) -> Self {
        self.life_window = window;
        self
    }
}

#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    written_at: Instant,
}

/// In-memory local store
///
/// Entries expire a fixed life window after being written and the oldest
/// entry is evicted when capacity is reached. Cloning creates a new handle
/// to the SAME underlying store.
#[derive(Debug, Clone)]
pub struct MemoryLocalStore {
    data: Arc<DashMap<String, LocalEntry>>,
    stats: Arc<RwLock<StoreStats>>,
    config: MemoryLocalConfig,
}

impl MemoryLocalStore {
    /// Create a new local store
    pub fn new(config: MemoryLocalConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(10_000))),
            stats: Arc::new(RwLock::new(StoreStats::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryLocalConfig::default())
    }

    fn is_expired(&self, entry: &LocalEntry) -> bool {
        entry.written_at.elapsed() >= self.config.life_window
    }

    /// Evict the oldest entry if at capacity
    fn maybe_evict(&self, incoming: &str) {
        if self.config.max_capacity == 0 || self.data.contains_key(incoming) {
            return;
        }
        if self.data.len() < self.config.max_capacity {
            return;
        }

        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.written_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            self.stats.write().evictions += 1;
        }
    }

    /// Remove a key
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.data.remove(key).is_some();
        if removed {
            self.stats.write().deletes += 1;
        }
        removed
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        let window = self.config.life_window;
        self.data.retain(|_, entry| entry.written_at.elapsed() < window);
        let removed = before.saturating_sub(self.data.len());
        self.stats.write().evictions += removed as u64;
        removed
    }

    /// Number of entries, including expired ones not yet cleaned up
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.read().clone();
        stats.size = self.data.len();
        stats.memory_bytes = self
            .data
            .iter()
            .map(|entry| entry.value.len() + entry.key().len())
            .sum();
        stats
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let found = self
            .data
            .get(key)
            .map(|entry| (!self.is_expired(&entry)).then(|| entry.value.clone()));
        let hit = match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                let window = self.config.life_window;
                if self
                    .data
                    .remove_if(key, |_, entry| entry.written_at.elapsed() >= window)
                    .is_some()
                {
                    self.stats.write().evictions += 1;
                }
                None
            }
            None => None,
        };

        let mut stats = self.stats.write();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(hit)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.config.max_entry_size > 0 && value.len() > self.config.max_entry_size {
            return Err(Error::LocalStore(format!(
                "entry of {} bytes exceeds limit of {} bytes",
                value.len(),
                self.config.max_entry_size
            )));
        }

        self.maybe_evict(key);
        self.data.insert(
            key.to_string(),
            LocalEntry {
                value,
                written_at: Instant::now(),
            },
        );
        self.stats.write().writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let store = MemoryLocalStore::with_defaults();
        store.set("orders/primary/order:42", b"paid".to_vec()).unwrap();

        assert_eq!(
            store.get("orders/primary/order:42").unwrap(),
            Some(b"paid".to_vec())
        );
        assert_eq!(store.get("orders/primary/order:43").unwrap(), None);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let store = MemoryLocalStore::new(MemoryLocalConfig::with_capacity(2));
        store.set("a", vec![1]).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        store.set("b", vec![2]).unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        // Overwriting an existing key never evicts
        store.set("b", vec![3]).unwrap();
        assert_eq!(store.len(), 2);

        store.set("c", vec![4]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("c").unwrap(), Some(vec![4]));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let config = MemoryLocalConfig {
            max_entry_size: 4,
            ..Default::default()
        };
        let store = MemoryLocalStore::new(config);
        let err = store.set("big", vec![0; 5]).unwrap_err();
        assert!(matches!(err, Error::LocalStore(_)));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_life_window_expiry() {
        let store =
            MemoryLocalStore::new(MemoryLocalConfig::default().life_window(Duration::from_secs(5)));
        store.set("k", vec![1]).unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").unwrap(), Some(vec![1]));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let store =
            MemoryLocalStore::new(MemoryLocalConfig::default().life_window(Duration::from_secs(5)));
        store.set("old", vec![1]).unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        store.set("new", vec![2]).unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
