//! Core traits for pools and caches

mod config;
mod key;
mod telemetry;
mod serializer;
mod store;
mod tracing_metrics;

pub use config::{ConfigChange, ConfigSource, ConfigWatcher};
pub use key::CacheKey;
pub use telemetry::{CacheTier, Metrics, NoopMetrics, Operation, PoolEvent};
pub use serializer::{JsonSerializer, Serializer};
pub use store::{LocalStore, RemoteStore};
pub use tracing_metrics::TracingMetrics;

#[cfg(feature = "metrics")]
pub use telemetry::MetricsCrateAdapter;

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;
