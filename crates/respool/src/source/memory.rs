//! Programmatic configuration source

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use respool_core::{ConfigPath, ConfigSource, ConfigWatcher, Result};

use super::snapshot::SnapshotHub;

/// Configuration tree held in memory and edited in code
///
/// Useful for tests and for services that assemble configuration
/// themselves. Every edit notifies the watchers whose path it touches.
pub struct MemoryConfigSource {
    hub: Arc<SnapshotHub>,
}

impl Default for MemoryConfigSource {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl MemoryConfigSource {
    /// Create a source holding `tree`
    pub fn new(tree: Value) -> Self {
        Self {
            hub: Arc::new(SnapshotHub::new(tree)),
        }
    }

    /// Current tree
    pub fn snapshot(&self) -> Arc<Value> {
        self.hub.current()
    }

    /// Write `value` at `path`, creating intermediate objects
    pub fn set(&self, path: &[&str], value: Value) {
        self.hub.update(|tree| {
            let mut node = tree;
            for segment in path {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                node = match node {
                    Value::Object(map) => map
                        .entry(segment.to_string())
                        .or_insert_with(|| Value::Object(Map::new())),
                    _ => return,
                };
            }
            *node = value;
        });
    }

    /// Remove the value at `path`, returning whether it existed
    pub fn remove(&self, path: &[&str]) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        self.hub.update(|tree| {
            let parent = parents
                .iter()
                .try_fold(tree, |node, segment| node.get_mut(*segment));
            match parent {
                Some(Value::Object(map)) => map.remove(*last).is_some(),
                _ => false,
            }
        })
    }

    /// Replace the whole tree
    pub fn replace(&self, tree: Value) {
        self.hub.publish(tree);
    }

    /// Send a transient error to every active watcher
    pub fn fail_watchers(&self, message: impl Into<String>) {
        self.hub.fail(message);
    }

    /// End every watch stream; the tree stays readable
    pub fn close(&self) {
        self.hub.close();
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigSource {
    async fn load(&self, path: &ConfigPath) -> Result<Option<Value>> {
        Ok(self.hub.load(path))
    }

    async fn watch(&self, path: &ConfigPath) -> Result<Box<dyn ConfigWatcher>> {
        Ok(Box::new(self.hub.watch(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_load() {
        let source = MemoryConfigSource::default();
        source.set(&["orders", "redis", "primary"], json!({ "addrs": ["a:1"] }));

        let path = ConfigPath::new(["orders", "redis", "primary"]);
        assert_eq!(
            source.load(&path).await.unwrap(),
            Some(json!({ "addrs": ["a:1"] }))
        );
        assert_eq!(
            source.load(&ConfigPath::new(["orders", "redis", "other"])).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_set_overwrites_scalar_parent() {
        let source = MemoryConfigSource::new(json!({ "svc": "scalar" }));
        source.set(&["svc", "kafka", "main"], json!("b:9092"));
        assert_eq!(
            *source.snapshot(),
            json!({ "svc": { "kafka": { "main": "b:9092" } } })
        );
    }

    #[tokio::test]
    async fn test_remove_notifies() {
        let source = MemoryConfigSource::new(json!({ "svc": { "mongo": { "main": { "addr": "x" } } } }));
        let path = ConfigPath::new(["svc", "mongo", "main"]);
        let mut watcher = source.watch(&path).await.unwrap();

        assert!(source.remove(&["svc", "mongo", "main"]));
        assert!(!source.remove(&["svc", "mongo", "main"]));
        assert!(!source.remove(&[]));

        let change = watcher.next().await.unwrap().unwrap();
        assert_eq!(change.path, path);
        assert!(change.value.is_none());
    }

    #[tokio::test]
    async fn test_fail_and_close() {
        let source = MemoryConfigSource::default();
        let mut watcher = source.watch(&ConfigPath::new(["svc"])).await.unwrap();

        source.fail_watchers("boom");
        assert!(watcher.next().await.is_err());

        source.close();
        assert!(watcher.next().await.unwrap().is_none());
    }
}
