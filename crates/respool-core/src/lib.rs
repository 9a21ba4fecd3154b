//! respool-core: Core traits and types for the respool library
//!
//! This crate provides the error type, pool keys, the configuration source
//! contract, store traits, serializers and telemetry hooks shared by the
//! storage backends and the pool manager.

mod error;
mod traits;
mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
