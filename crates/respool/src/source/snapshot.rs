//! Versioned configuration tree with per-path change detection

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use respool_core::{ConfigChange, ConfigPath, ConfigWatcher, Error, Result};

type Update = std::result::Result<Arc<Value>, String>;

const CHANNEL_CAPACITY: usize = 64;

/// Current configuration tree plus a broadcast of every new version
///
/// Watchers compare the value at their own path against the last value
/// they saw, so an update elsewhere in the tree is not a change for them
/// and a lagged receiver still converges on the newest tree.
pub(crate) struct SnapshotHub {
    tree: RwLock<Arc<Value>>,
    sender: Mutex<Option<broadcast::Sender<Update>>>,
}

impl SnapshotHub {
    pub(crate) fn new(tree: Value) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tree: RwLock::new(Arc::new(tree)),
            sender: Mutex::new(Some(sender)),
        }
    }

    pub(crate) fn current(&self) -> Arc<Value> {
        self.tree.read().clone()
    }

    pub(crate) fn load(&self, path: &ConfigPath) -> Option<Value> {
        path.lookup(&self.tree.read()).cloned()
    }

    /// Install a new tree and notify watchers
    pub(crate) fn publish(&self, tree: Value) {
        let mut current = self.tree.write();
        *current = Arc::new(tree);
        if let Some(sender) = self.sender.lock().as_ref() {
            // No receivers is fine
            let _ = sender.send(Ok(current.clone()));
        }
    }

    /// Apply an edit to a copy of the current tree and publish it
    pub(crate) fn update<F, R>(&self, edit: F) -> R
    where
        F: FnOnce(&mut Value) -> R,
    {
        let mut current = self.tree.write();
        let mut tree = Value::clone(&current);
        let outcome = edit(&mut tree);
        *current = Arc::new(tree);
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(Ok(current.clone()));
        }
        outcome
    }

    /// Deliver a transient failure to every watcher
    pub(crate) fn fail(&self, message: impl Into<String>) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(Err(message.into()));
        }
    }

    /// End every watch stream; later watches are refused
    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }

    pub(crate) fn watch(&self, path: &ConfigPath) -> Result<SnapshotWatcher> {
        // Read lock orders this subscription against concurrent publishes
        let tree = self.tree.read();
        let receiver = self
            .sender
            .lock()
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| Error::Watch("configuration source is closed".to_string()))?;

        Ok(SnapshotWatcher {
            path: path.clone(),
            last: path.lookup(&tree).cloned(),
            receiver,
        })
    }
}

/// Watch stream for one path of a [`SnapshotHub`]
pub(crate) struct SnapshotWatcher {
    path: ConfigPath,
    last: Option<Value>,
    receiver: broadcast::Receiver<Update>,
}

#[async_trait]
impl ConfigWatcher for SnapshotWatcher {
    async fn next(&mut self) -> Result<Option<ConfigChange>> {
        loop {
            match self.receiver.recv().await {
                Ok(Ok(tree)) => {
                    let value = self.path.lookup(&tree).cloned();
                    if value != self.last {
                        self.last = value.clone();
                        return Ok(Some(ConfigChange {
                            path: self.path.clone(),
                            value,
                        }));
                    }
                }
                Ok(Err(message)) => return Err(Error::Watch(message)),
                Err(RecvError::Lagged(missed)) => {
                    debug!(path = %self.path, missed, "configuration watcher lagged");
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> ConfigPath {
        ConfigPath::new(segments.iter().copied())
    }

    #[tokio::test]
    async fn test_change_at_path() {
        let hub = SnapshotHub::new(json!({ "svc": { "redis": { "main": { "addrs": ["a:1"] } } } }));
        let mut watcher = hub.watch(&path(&["svc", "redis", "main"])).unwrap();

        // Unrelated edit is skipped, the relevant one is delivered
        hub.publish(json!({
            "svc": { "redis": { "main": { "addrs": ["a:1"] }, "other": {} } }
        }));
        hub.publish(json!({ "svc": { "redis": { "main": { "addrs": ["b:1"] } } } }));

        let change = watcher.next().await.unwrap().unwrap();
        assert_eq!(change.value, Some(json!({ "addrs": ["b:1"] })));
    }

    #[tokio::test]
    async fn test_removal_and_failure() {
        let hub = SnapshotHub::new(json!({ "svc": { "kafka": { "main": { "t": "b:9092" } } } }));
        let mut watcher = hub.watch(&path(&["svc", "kafka", "main", "t"])).unwrap();

        hub.fail("backend unavailable");
        assert!(matches!(watcher.next().await, Err(Error::Watch(_))));

        hub.publish(json!({ "svc": {} }));
        let change = watcher.next().await.unwrap().unwrap();
        assert_eq!(change.value, None);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let hub = SnapshotHub::new(json!({}));
        let mut watcher = hub.watch(&path(&["svc"])).unwrap();
        hub.close();

        assert!(watcher.next().await.unwrap().is_none());
        assert!(hub.watch(&path(&["svc"])).is_err());
    }

    #[tokio::test]
    async fn test_lagged_watcher_converges() {
        let hub = SnapshotHub::new(json!({ "n": 0 }));
        let mut watcher = hub.watch(&path(&["n"])).unwrap();
        for n in 1..=(CHANNEL_CAPACITY as i64 * 2) {
            hub.publish(json!({ "n": n }));
        }

        let mut last = None;
        while let Ok(Ok(Some(change))) =
            tokio::time::timeout(std::time::Duration::from_millis(50), watcher.next()).await
        {
            last = change.value;
        }
        assert_eq!(last, Some(json!(CHANNEL_CAPACITY as i64 * 2)));
    }
}
