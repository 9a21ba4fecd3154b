//! Generic config-reactive pool

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use respool_core::{
    ConfigPath, ConfigSource, Error, Metrics, Operation, PoolEvent, PoolKey, Result,
};

use super::adapter::{ResourceAdapter, RolePolicy};
use super::entry::PoolEntry;
use super::settings::PoolSettings;

/// Shared state behind a [`ResourcePool`] and its watch tasks
pub(crate) struct PoolInner<A: ResourceAdapter> {
    pub(super) adapter: A,
    pub(super) entries: DashMap<PoolKey, Arc<PoolEntry<A::Handle>>>,
    pub(super) locks: DashMap<PoolKey, Arc<Mutex<()>>>,
    generation: AtomicU64,
    pub(super) source: Arc<dyn ConfigSource>,
    pub(super) settings: PoolSettings,
    pub(super) metrics: Arc<dyn Metrics>,
    pub(super) token: CancellationToken,
    pub(super) tracker: TaskTracker,
}

impl<A: ResourceAdapter> PoolInner<A> {
    pub(super) fn new(
        adapter: A,
        source: Arc<dyn ConfigSource>,
        settings: PoolSettings,
        metrics: Arc<dyn Metrics>,
        token: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            adapter,
            entries: DashMap::new(),
            locks: DashMap::new(),
            generation: AtomicU64::new(0),
            source,
            settings,
            metrics,
            token,
            tracker,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn lookup(&self, key: &PoolKey) -> Option<Arc<A::Handle>> {
        self.entries.get(key).map(|entry| entry.handle.clone())
    }

    /// Log and count a failed construction
    fn fail(&self, key: &PoolKey, error: Error) -> Error {
        warn!(kind = A::KIND, key = %key, error = %error, "failed to construct pooled handle");
        self.metrics
            .record_pool_event(A::KIND, key, PoolEvent::ConstructionFailed);
        error
    }

    /// Build, verify and register a handle; caller holds the key's lock
    async fn construct(self: &Arc<Self>, key: &PoolKey) -> Result<Arc<A::Handle>> {
        let path = key.config_path(A::SECTION);

        // Subscribe first so a change between read and subscribe is seen
        let watcher = self.source.watch(&path).await.map_err(|e| {
            self.fail(key, Error::Configuration(format!("cannot watch {path}: {e}")))
        })?;

        let raw = self.source.load(&path).await.map_err(|e| {
            self.fail(key, Error::Configuration(format!("cannot read {path}: {e}")))
        })?;
        let Some(raw) = raw else {
            return Err(self.fail(
                key,
                Error::Configuration(format!("no {} configuration at {path}", A::KIND)),
            ));
        };

        let config: A::Config = serde_json::from_value(raw).map_err(|e| {
            self.fail(
                key,
                Error::Configuration(format!("invalid {} configuration at {path}: {e}", A::KIND)),
            )
        })?;

        debug!(
            kind = A::KIND,
            key = %key,
            bounds = %A::describe(&config),
            "constructing pooled handle"
        );
        let handle = match self.adapter.connect(key, &config).await {
            Ok(handle) => handle,
            Err(e @ Error::Construction { .. }) => return Err(self.fail(key, e)),
            Err(e) => return Err(self.fail(key, Error::construction(key, e))),
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Arc::new(PoolEntry::new(
            generation,
            handle,
            self.token.child_token(),
        ));
        self.entries.insert(key.clone(), entry.clone());

        if self.token.is_cancelled() {
            // Shutdown raced with construction; nothing will drain this entry
            self.entries
                .remove_if(key, |_, current| current.generation == generation);
            self.close_entry(key, &entry).await;
            return Err(Error::Shutdown);
        }

        info!(kind = A::KIND, key = %key, generation, "constructed pooled handle");
        self.metrics
            .record_pool_event(A::KIND, key, PoolEvent::Constructed);

        let handle = entry.handle.clone();
        self.tracker
            .spawn(Arc::clone(self).watch_entry(key.clone(), entry, watcher));
        Ok(handle)
    }
}

/// Outcome of [`ResourcePool::prewarm`]
#[derive(Debug, Default)]
pub struct PrewarmReport {
    /// Keys with a live handle after prewarm, sorted
    pub warmed: Vec<PoolKey>,
    /// Connections opened across all handles
    pub primed: usize,
    /// Keys that could not be constructed
    pub failed: Vec<(PoolKey, Error)>,
}

impl PrewarmReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of live handles for one resource kind
///
/// Handles are built lazily on first [`acquire`](Self::acquire), shared by
/// every caller, and replaced when the configuration behind them changes.
/// Cloning yields another reference to the same registry.
pub struct ResourcePool<A: ResourceAdapter> {
    inner: Arc<PoolInner<A>>,
}

impl<A: ResourceAdapter> Clone for ResourcePool<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ResourceAdapter> fmt::Debug for ResourcePool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("kind", &A::KIND)
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

impl<A: ResourceAdapter> ResourcePool<A> {
    pub(crate) fn from_inner(inner: Arc<PoolInner<A>>) -> Self {
        Self { inner }
    }

    /// Resource kind label
    pub fn kind(&self) -> &'static str {
        A::KIND
    }

    /// The adapter this pool builds handles with
    pub fn adapter(&self) -> &A {
        &self.inner.adapter
    }

    /// Get the live handle for `key`, constructing it on first use
    ///
    /// Concurrent callers for an absent key share a single construction.
    /// Failures are returned to every waiter that attempted construction
    /// and nothing is cached, so the next call tries again.
    pub async fn acquire(&self, key: impl Into<PoolKey>) -> Result<Arc<A::Handle>> {
        let key = key.into();
        A::ROLE.check(A::KIND, &key)?;
        self.inner.ensure_running()?;

        if let Some(handle) = self.inner.lookup(&key) {
            return Ok(handle);
        }

        let lock = self.inner.locks.entry(key.clone()).or_default().clone();
        let result = self.construct_once(&key, &lock).await;

        // Last holder drops the lock so failed or retired names do not accumulate
        drop(lock);
        self.inner
            .locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Construct under the key's lock unless a waiter ahead of us already did
    async fn construct_once(&self, key: &PoolKey, lock: &Mutex<()>) -> Result<Arc<A::Handle>> {
        let start = Instant::now();
        let _guard = lock.lock().await;

        self.inner.ensure_running()?;
        if let Some(handle) = self.inner.lookup(key) {
            return Ok(handle);
        }

        let result = self.inner.construct(key).await;
        self.inner
            .metrics
            .record_latency(Operation::Acquire, start.elapsed());
        result
    }

    /// Retire the live handle for `key` as if its configuration changed
    ///
    /// The handle is dropped from the registry now and closed after the
    /// grace period. Returns whether a handle was live.
    pub fn invalidate(&self, key: impl Into<PoolKey>) -> bool {
        let key = key.into();
        let Some((_, entry)) = self.inner.entries.remove(&key) else {
            return false;
        };

        entry.watch_stop.cancel();
        info!(kind = A::KIND, key = %key, generation = entry.generation, "invalidated pooled handle");
        self.inner
            .metrics
            .record_pool_event(A::KIND, &key, PoolEvent::Reloaded);
        self.inner
            .tracker
            .spawn(Arc::clone(&self.inner).drain(key, entry));
        true
    }

    /// Construct and prime every resource declared for `service`
    ///
    /// Each name under the kind's section is acquired, once per entry of
    /// `roles` present in its configuration when the kind requires roles.
    /// Failures are logged and reported, never fatal.
    pub async fn prewarm(&self, service: &str, roles: &[&str]) -> Result<PrewarmReport> {
        self.inner.ensure_running()?;

        let section = ConfigPath::new([service, A::SECTION]);
        let tree = self
            .inner
            .source
            .load(&section)
            .await
            .map_err(|e| Error::Configuration(format!("cannot read {section}: {e}")))?;
        let Some(Value::Object(names)) = tree else {
            warn!(kind = A::KIND, path = %section, "nothing to prewarm");
            return Ok(PrewarmReport::default());
        };

        let mut keys = Vec::new();
        for (name, value) in &names {
            match A::ROLE {
                RolePolicy::Forbidden => keys.push(PoolKey::new(service, name)),
                RolePolicy::Required => {
                    for role in roles {
                        if value.get(*role).is_some() {
                            keys.push(PoolKey::new(service, name).with_role(*role));
                        } else {
                            debug!(kind = A::KIND, name = %name, role = %role, "role not configured, skipping");
                        }
                    }
                }
            }
        }

        let prime = self.inner.settings.prime_connections;
        let concurrency = self.inner.settings.prewarm_concurrency.max(1);
        let outcomes: Vec<(PoolKey, Result<usize>)> = stream::iter(keys)
            .map(|key| async move {
                let outcome = match self.acquire(key.clone()).await {
                    Ok(handle) => match self.inner.adapter.prime(&handle, prime).await {
                        Ok(opened) => Ok(opened),
                        Err(e) => {
                            warn!(kind = A::KIND, key = %key, error = %e, "failed to prime pooled handle");
                            Ok(0)
                        }
                    },
                    Err(e) => Err(e),
                };
                (key, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = PrewarmReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(opened) => {
                    report.primed += opened;
                    report.warmed.push(key);
                }
                Err(e) => report.failed.push((key, e)),
            }
        }
        report.warmed.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            kind = A::KIND,
            service = %service,
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            primed = report.primed,
            "prewarm finished"
        );
        Ok(report)
    }

    /// Whether a live handle is registered for `key`
    pub fn contains(&self, key: &PoolKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Keys with a live handle
    pub fn keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryKvAdapter;
    use crate::pool::PoolManager;
    use crate::source::MemoryConfigSource;
    use serde_json::json;

    #[tokio::test]
    async fn test_construction_locks_released() {
        let source = Arc::new(MemoryConfigSource::new(json!({
            "orders": { "memory_kv": { "primary": {} } }
        })));
        let manager = PoolManager::new(source);
        let pool = manager.pool(MemoryKvAdapter);

        pool.acquire(("orders", "primary")).await.unwrap();
        assert!(pool.inner.locks.is_empty());

        for name in ["gone-1", "gone-2", "gone-3"] {
            assert!(pool.acquire(("orders", name)).await.is_err());
        }
        assert!(pool.inner.locks.is_empty());

        let concurrent = futures_util::future::join_all(
            (0..8).map(|_| pool.acquire(("orders", "missing"))),
        )
        .await;
        assert!(concurrent.iter().all(Result::is_err));
        assert!(pool.inner.locks.is_empty());

        manager.shutdown().await;
    }
}
