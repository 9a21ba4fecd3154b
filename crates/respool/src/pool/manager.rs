//! Pool manager owning configuration, settings and background tasks

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use respool_core::{ConfigSource, Metrics, NoopMetrics};

use super::adapter::ResourceAdapter;
use super::resource::{PoolInner, ResourcePool};
use super::settings::PoolSettings;

/// A pool the manager closes on shutdown
#[async_trait]
trait Drain: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn close_all(&self) -> usize;
}

#[async_trait]
impl<A: ResourceAdapter> Drain for PoolInner<A> {
    fn kind(&self) -> &'static str {
        A::KIND
    }

    async fn close_all(&self) -> usize {
        PoolInner::close_all(self).await
    }
}

/// Owner of every resource pool in a process
///
/// Holds the configuration source, shared [`PoolSettings`], the telemetry
/// sink and the background tasks that watch configuration and drain
/// replaced handles. Create one at startup, build pools from it with
/// [`pool`](Self::pool) and call [`shutdown`](Self::shutdown) on exit.
///
/// ```rust,no_run
/// use respool::prelude::*;
/// use std::sync::Arc;
///
/// # async fn run() -> respool::Result<()> {
/// let source = Arc::new(MemoryConfigSource::new(serde_json::json!({
///     "orders": { "memory_kv": { "primary": {} } }
/// })));
/// let manager = PoolManager::new(source);
/// let kv = manager.pool(MemoryKvAdapter);
///
/// let store = kv.acquire(("orders", "primary")).await?;
/// store.set("order:42", b"paid".to_vec(), None).await?;
///
/// manager.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PoolManager {
    source: Arc<dyn ConfigSource>,
    settings: PoolSettings,
    metrics: Arc<dyn Metrics>,
    token: CancellationToken,
    tracker: TaskTracker,
    pools: Mutex<Vec<Arc<dyn Drain>>>,
}

impl PoolManager {
    /// Create a manager with default settings and no metrics
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            settings: PoolSettings::default(),
            metrics: Arc::new(NoopMetrics),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            pools: Mutex::new(Vec::new()),
        }
    }

    /// Replace the settings used by pools created afterwards
    pub fn with_settings(mut self, settings: PoolSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the telemetry sink used by pools created afterwards
    pub fn with_metrics(mut self, metrics: impl Metrics) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn source(&self) -> &Arc<dyn ConfigSource> {
        &self.source
    }

    /// Create a pool for one resource kind
    pub fn pool<A: ResourceAdapter>(&self, adapter: A) -> ResourcePool<A> {
        let inner = Arc::new(PoolInner::new(
            adapter,
            Arc::clone(&self.source),
            self.settings.clone(),
            Arc::clone(&self.metrics),
            self.token.clone(),
            self.tracker.clone(),
        ));
        self.pools.lock().push(inner.clone());
        ResourcePool::from_inner(inner)
    }

    /// Whether [`shutdown`](Self::shutdown) has started
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of background watch and drain tasks still running
    pub fn background_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Stop every watch task, close draining handles, then close every
    /// live handle in every pool
    ///
    /// Acquires after this point fail with `Error::Shutdown`. Calling it
    /// again is a no-op.
    pub async fn shutdown(&self) {
        if self.token.is_cancelled() {
            self.tracker.wait().await;
            return;
        }

        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let pools: Vec<Arc<dyn Drain>> = self.pools.lock().clone();
        let mut closed = 0;
        for pool in pools {
            let n = pool.close_all().await;
            if n > 0 {
                info!(kind = pool.kind(), closed = n, "closed live handles");
            }
            closed += n;
        }
        info!(closed, "pool manager shut down");
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        // Detached tasks must not outlive the manager
        self.token.cancel();
    }
}
