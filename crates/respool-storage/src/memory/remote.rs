//! In-process remote store with Redis-like semantics

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use respool_core::{Error, RemoteStore, Result, StoreStats};

#[derive(Debug, Clone)]
struct RemoteEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Deadline for `ttl`; zero and unrepresentable durations never expire
fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|ttl| !ttl.is_zero())
        .and_then(|ttl| Instant::now().checked_add(ttl))
}

impl RemoteEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: deadline(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory [`RemoteStore`]
///
/// Values are raw bytes and counters are stored as decimal text, so a
/// value written with `set_num` reads back through `get` the way it would
/// from Redis. Cloning creates a new handle to the SAME underlying store.
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore {
    data: Arc<DashMap<String, RemoteEntry>>,
    stats: Arc<RwLock<StoreStats>>,
    closed: Arc<AtomicBool>,
    max_entries: Option<usize>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryRemoteStore {
    /// Create a store, optionally refusing new keys past `max_entries`
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(StoreStats::default())),
            closed: Arc::new(AtomicBool::new(false)),
            max_entries,
        }
    }

    /// Mark the store closed; every later operation fails
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.data.iter().filter(|entry| !entry.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of a key, `None` when absent or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.data.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.data.len());
        self.stats.write().evictions += removed as u64;
        removed
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.read().clone();
        stats.size = self.len();
        stats
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Transport("store is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_room(&self, key: &str) -> Result<()> {
        let Some(max) = self.max_entries else {
            return Ok(());
        };
        if self.data.contains_key(key) || self.data.len() < max {
            return Ok(());
        }
        // Reclaim expired slots before refusing
        self.data.retain(|_, entry| !entry.is_expired());
        if self.data.len() < max {
            return Ok(());
        }
        Err(Error::Transport(format!("store is full ({max} entries)")))
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        // The shard guard must be released before removing
        let found = self
            .data
            .get(key)
            .map(|entry| (!entry.is_expired()).then(|| entry.value.clone()));
        let value = match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                if self.data.remove_if(key, |_, entry| entry.is_expired()).is_some() {
                    self.stats.write().evictions += 1;
                }
                None
            }
            None => None,
        };

        let mut stats = self.stats.write();
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        value
    }

    fn write(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_room(key)?;
        self.data.insert(key.to_string(), RemoteEntry::new(value, ttl));
        self.stats.write().writes += 1;
        Ok(())
    }

    fn add(&self, key: &str, delta: i64) -> Result<i64> {
        self.ensure_room(key)?;
        let next = match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let current = if entry.is_expired() {
                    entry.expires_at = None;
                    0
                } else {
                    parse_counter(&entry.value).map_err(|_| {
                        Error::Transport(format!("value at {key} is not an integer"))
                    })?
                };
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| Error::Transport(format!("counter at {key} overflowed")))?;
                entry.value = next.to_string().into_bytes();
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RemoteEntry::new(delta.to_string().into_bytes(), None));
                delta
            }
        };
        self.stats.write().writes += 1;
        Ok(next)
    }
}

fn parse_counter(bytes: &[u8]) -> std::result::Result<i64, String> {
    std::str::from_utf8(bytes)
        .map_err(|e| e.to_string())?
        .trim()
        .parse::<i64>()
        .map_err(|e| e.to_string())
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        self.write(key, value, ttl)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let removed = self
            .data
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired());
        if removed {
            self.stats.write().deletes += 1;
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.ensure_open()?;
        self.add(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.ensure_open()?;
        self.add(key, -1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.ensure_open()?;
        match self.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = deadline(Some(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_num(&self, key: &str) -> Result<Option<i64>> {
        self.ensure_open()?;
        match self.read(key) {
            Some(bytes) => parse_counter(&bytes)
                .map(Some)
                .map_err(|e| Error::Deserialization(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn set_num(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        self.write(key, value.to_string().into_bytes(), ttl)
    }

    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        self.ensure_open()?;
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryRemoteStore::default();
        store.set("k1", b"v1".to_vec(), None).await.unwrap();

        assert_eq!(store.get("k1").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);

        assert!(store.delete("k1").await.unwrap());
        assert!(!store.delete("k1").await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryRemoteStore::default();
        store
            .set("order:42", b"x".to_vec(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(store.ttl("order:42"), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("order:42").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("order:42").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let store = MemoryRemoteStore::default();
        store.set("k", vec![1], Some(Duration::ZERO)).await.unwrap();
        assert_eq!(store.ttl("k"), None);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_never_expires() {
        let store = MemoryRemoteStore::default();
        store.set("forever", vec![1], Some(Duration::MAX)).await.unwrap();
        assert_eq!(store.ttl("forever"), None);
        assert!(store.expire("forever", Duration::MAX).await.unwrap());

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(store.get("forever").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire() {
        let store = MemoryRemoteStore::default();
        assert_eq!(store.incr("window").await.unwrap(), 1);
        assert!(store.expire("window", Duration::from_secs(10)).await.unwrap());
        assert!(!store.expire("absent", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("window").await.unwrap(), None);
        assert_eq!(store.incr("window").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_counters() {
        let store = MemoryRemoteStore::default();
        assert_eq!(store.incr("hits").await.unwrap(), 1);
        assert_eq!(store.incr("hits").await.unwrap(), 2);
        assert_eq!(store.decr("hits").await.unwrap(), 1);
        assert_eq!(store.decr("fresh").await.unwrap(), -1);

        store.set_num("n", 7, None).await.unwrap();
        assert_eq!(store.get_num("n").await.unwrap(), Some(7));
        assert_eq!(store.get("n").await.unwrap(), Some(b"7".to_vec()));
        assert_eq!(store.get_num("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counter_on_non_integer() {
        let store = MemoryRemoteStore::default();
        store.set("blob", b"not a number".to_vec(), None).await.unwrap();

        assert!(matches!(
            store.incr("blob").await.unwrap_err(),
            Error::Transport(_)
        ));
        assert!(matches!(
            store.get_num("blob").await.unwrap_err(),
            Error::Deserialization(_)
        ));
    }

    #[tokio::test]
    async fn test_get_many_preserves_order() {
        let store = MemoryRemoteStore::default();
        store.set("a", vec![1], None).await.unwrap();
        store.set("c", vec![3], None).await.unwrap();

        let values = store.get_many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values, vec![Some(vec![1]), None, Some(vec![3])]);
    }

    #[tokio::test]
    async fn test_max_entries() {
        let store = MemoryRemoteStore::new(Some(1));
        store.set("a", vec![1], None).await.unwrap();
        // Overwrite is allowed at capacity
        store.set("a", vec![2], None).await.unwrap();

        let err = store.set("b", vec![1], None).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_closed_store_rejects() {
        let store = MemoryRemoteStore::default();
        let other = store.clone();
        store.close();

        assert!(other.is_closed());
        assert!(matches!(
            other.get("k").await.unwrap_err(),
            Error::Transport(_)
        ));
    }
}
