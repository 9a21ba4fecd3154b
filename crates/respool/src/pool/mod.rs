//! Config-reactive resource pools
//!
//! A [`ResourcePool`] maps `(service, name[, role])` keys to shared client
//! handles. Each handle is built from the configuration section at
//! `[service, SECTION, name(, role)]`, shared by every caller, and replaced
//! when that section changes: the registry switches to a fresh handle on
//! the next acquire while the old one drains for a grace period before it
//! is closed.

mod adapter;
mod entry;
mod manager;
mod resource;
mod settings;
mod watch;

pub use adapter::{ResourceAdapter, RolePolicy};
pub use manager::PoolManager;
pub use resource::{PrewarmReport, ResourcePool};
pub use settings::PoolSettings;
