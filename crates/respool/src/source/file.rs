//! JSON file configuration source with hot reload

use async_trait::async_trait;
use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Result as NotifyResult,
    Watcher,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use respool_core::{ConfigPath, ConfigSource, ConfigWatcher, Error, Result};

use super::snapshot::SnapshotHub;

/// Default debounce for bursts of file events
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Configuration tree read from a JSON file and reloaded when it changes
///
/// The parent directory is watched so editors that replace the file on
/// save are picked up. A file that fails to read or parse leaves the last
/// good tree in place and is reported to watchers as a watch error.
pub struct FileConfigSource {
    path: PathBuf,
    hub: Arc<SnapshotHub>,
    _watcher: RecommendedWatcher,
}

impl FileConfigSource {
    /// Load `path` and start watching it
    ///
    /// Must be called within a Tokio runtime.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_debounce(path, DEFAULT_DEBOUNCE).await
    }

    /// Load `path` and start watching it, coalescing events within `debounce`
    pub async fn open_with_debounce(path: impl AsRef<Path>, debounce: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tree = read_tree(&path)
            .await
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
        let hub = Arc::new(SnapshotHub::new(tree));

        let (tx, rx) = mpsc::channel::<()>(16);
        let file_name = path.file_name().map(ToOwned::to_owned);
        let mut watcher = RecommendedWatcher::new(
            move |res: NotifyResult<Event>| {
                if let Ok(event) = res {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == file_name.as_deref());
                    if relevant {
                        // A full channel already has a reload pending
                        let _ = tx.try_send(());
                    }
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Configuration(format!("cannot watch {}: {e}", path.display())))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Configuration(format!("cannot watch {}: {e}", dir.display())))?;

        tokio::spawn(reload_loop(path.clone(), Arc::clone(&hub), rx, debounce));
        info!(path = %path.display(), "watching configuration file");

        Ok(Self {
            path,
            hub,
            _watcher: watcher,
        })
    }

    /// The watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current tree
    pub fn snapshot(&self) -> Arc<Value> {
        self.hub.current()
    }

    /// Re-read the file now
    pub async fn reload(&self) -> Result<()> {
        reload_into(&self.path, &self.hub).await
    }
}

async fn read_tree(path: &Path) -> std::result::Result<Value, String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

async fn reload_into(path: &Path, hub: &SnapshotHub) -> Result<()> {
    match read_tree(path).await {
        Ok(tree) => {
            debug!(path = %path.display(), "configuration file reloaded");
            hub.publish(tree);
            Ok(())
        }
        Err(e) => {
            let message = format!("{}: {e}", path.display());
            warn!(path = %path.display(), error = %e, "failed to reload configuration file");
            hub.fail(message.clone());
            Err(Error::Configuration(message))
        }
    }
}

async fn reload_loop(
    path: PathBuf,
    hub: Arc<SnapshotHub>,
    mut rx: mpsc::Receiver<()>,
    debounce: Duration,
) {
    while rx.recv().await.is_some() {
        tokio::time::sleep(debounce).await;
        while rx.try_recv().is_ok() {}
        let _ = reload_into(&path, &hub).await;
    }

    // Watcher dropped with the source
    hub.close();
    debug!(path = %path.display(), "configuration file watch ended");
}

#[async_trait]
impl ConfigSource for FileConfigSource {
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

    fn write(path: &Path, value: &Value) {
        std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_open_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        write(&file, &json!({ "orders": { "memory_kv": { "primary": {} } } }));

        let source = FileConfigSource::open(&file).await.unwrap();
        let path = ConfigPath::new(["orders", "memory_kv", "primary"]);
        assert_eq!(source.load(&path).await.unwrap(), Some(json!({})));
        assert_eq!(source.path(), file.as_path());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, b"{ not json").unwrap();

        let err = FileConfigSource::open(&file).await.err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_reload_notifies_watchers() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        write(&file, &json!({ "svc": { "kafka": { "main": { "t": "a:9092" } } } }));

        let source = FileConfigSource::open(&file).await.unwrap();
        let path = ConfigPath::new(["svc", "kafka", "main", "t"]);
        let mut watcher = source.watch(&path).await.unwrap();

        write(&file, &json!({ "svc": { "kafka": { "main": { "t": "b:9092" } } } }));
        source.reload().await.unwrap();

        let change = watcher.next().await.unwrap().unwrap();
        assert_eq!(change.value, Some(json!("b:9092")));
    }

    #[tokio::test]
    async fn test_broken_file_keeps_last_tree() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        write(&file, &json!({ "svc": { "n": 1 } }));

        let source = FileConfigSource::open(&file).await.unwrap();
        let mut watcher = source.watch(&ConfigPath::new(["svc"])).await.unwrap();

        std::fs::write(&file, b"{ broken").unwrap();
        assert!(source.reload().await.is_err());
        assert!(matches!(watcher.next().await, Err(Error::Watch(_))));
        assert_eq!(*source.snapshot(), json!({ "svc": { "n": 1 } }));
    }
}
