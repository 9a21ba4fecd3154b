//! In-process stores

mod local;
mod remote;

pub use local::{MemoryLocalConfig, MemoryLocalStore};
pub use remote::MemoryRemoteStore;
