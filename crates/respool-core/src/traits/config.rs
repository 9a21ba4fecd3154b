//! Configuration source contract

use async_trait::async_trait;
use serde_json::Value;

use crate::{ConfigPath, Result};

/// A change observed at a watched path
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// The watched path
    pub path: ConfigPath,
    /// New value at the path, `None` when the section was removed
    pub value: Option<Value>,
}

/// Provider of structured configuration with change notification
///
/// Pools depend only on this get + blocking-watch contract, never on a
/// specific transport.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Read the value at `path`
    ///
    /// Returns `Ok(None)` when no such section exists.
    async fn load(&self, path: &ConfigPath) -> Result<Option<Value>>;

    /// Subscribe to changes of the value at `path`
    ///
    /// The subscription starts from the value current at call time, so a
    /// change made after `watch` returns is never missed.
    async fn watch(&self, path: &ConfigPath) -> Result<Box<dyn ConfigWatcher>>;
}

/// A live subscription returned by [`ConfigSource::watch`]
#[async_trait]
pub trait ConfigWatcher: Send + 'static {
    /// Wait for the next change
    ///
    /// - `Ok(Some(change))`: the value at the path changed
    /// - `Ok(None)`: the source closed, no further changes will arrive
    /// - `Err(Error::Watch(_))`: transient failure, calling again resumes
    async fn next(&mut self) -> Result<Option<ConfigChange>>;
}
