//! Watch, drain and close for pooled handles

use std::sync::Arc;
use tracing::{debug, info, warn};

use respool_core::{ConfigWatcher, PoolEvent, PoolKey};

use super::adapter::ResourceAdapter;
use super::entry::PoolEntry;
use super::resource::PoolInner;

impl<A: ResourceAdapter> PoolInner<A> {
    /// Follow configuration changes for one entry generation
    ///
    /// Runs on the manager's tracker until the first change, the end of the
    /// watch stream, early retirement of the entry, or shutdown.
    pub(super) async fn watch_entry(
        self: Arc<Self>,
        key: PoolKey,
        entry: Arc<PoolEntry<A::Handle>>,
        mut watcher: Box<dyn ConfigWatcher>,
    ) {
        loop {
            let next = tokio::select! {
                _ = entry.watch_stop.cancelled() => {
                    debug!(kind = A::KIND, key = %key, generation = entry.generation, "watch stopped");
                    return;
                }
                next = watcher.next() => next,
            };

            match next {
                Ok(Some(change)) => {
                    info!(
                        kind = A::KIND,
                        key = %key,
                        path = %change.path,
                        removed = change.value.is_none(),
                        "configuration changed, reloading"
                    );
                    self.retire(key, entry).await;
                    return;
                }
                Ok(None) => {
                    debug!(kind = A::KIND, key = %key, "configuration watch closed, keeping handle");
                    return;
                }
                Err(e) => {
                    warn!(
                        kind = A::KIND,
                        key = %key,
                        error = %e,
                        backoff = ?self.settings.watch_backoff,
                        "configuration watch failed"
                    );
                    tokio::select! {
                        _ = entry.watch_stop.cancelled() => return,
                        _ = tokio::time::sleep(self.settings.watch_backoff) => {}
                    }
                }
            }
        }
    }

    /// Remove `entry` if it is still the registered generation, then drain it
    async fn retire(self: Arc<Self>, key: PoolKey, entry: Arc<PoolEntry<A::Handle>>) {
        let generation = entry.generation;
        let removed = self
            .entries
            .remove_if(&key, |_, current| current.generation == generation);
        if removed.is_none() {
            debug!(kind = A::KIND, key = %key, generation, "entry already replaced");
            return;
        }

        self.metrics
            .record_pool_event(A::KIND, &key, PoolEvent::Reloaded);
        self.drain(key, entry).await;
    }

    /// Wait out the grace period, then close; shutdown cuts the wait short
    pub(super) async fn drain(self: Arc<Self>, key: PoolKey, entry: Arc<PoolEntry<A::Handle>>) {
        let grace = self.settings.grace_period;
        debug!(kind = A::KIND, key = %key, generation = entry.generation, grace = ?grace, "draining pooled handle");

        tokio::select! {
            _ = self.token.cancelled() => {
                debug!(kind = A::KIND, key = %key, "shutdown during grace period, closing now");
            }
            _ = tokio::time::sleep(grace) => {}
        }

        self.close_entry(&key, &entry).await;
    }

    /// Close the handle unless it was already closed
    pub(super) async fn close_entry(&self, key: &PoolKey, entry: &PoolEntry<A::Handle>) -> bool {
        if !entry.claim_close() {
            return false;
        }

        match self.adapter.close(&entry.handle).await {
            Ok(()) => {
                info!(kind = A::KIND, key = %key, generation = entry.generation, "closed pooled handle");
                self.metrics
                    .record_pool_event(A::KIND, key, PoolEvent::Closed);
            }
            Err(e) => {
                warn!(
                    kind = A::KIND,
                    key = %key,
                    generation = entry.generation,
                    error = %e,
                    "failed to close pooled handle"
                );
                self.metrics
                    .record_pool_event(A::KIND, key, PoolEvent::CloseFailed);
            }
        }
        true
    }

    /// Close every live handle; used on shutdown
    pub(super) async fn close_all(&self) -> usize {
        let keys: Vec<PoolKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();

        let mut closed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                entry.watch_stop.cancel();
                if self.close_entry(&key, &entry).await {
                    closed += 1;
                }
            }
        }
        self.locks.clear();
        closed
    }
}
