//! Configuration sources

mod file;
mod memory;
mod snapshot;

pub use file::FileConfigSource;
pub use memory::MemoryConfigSource;
