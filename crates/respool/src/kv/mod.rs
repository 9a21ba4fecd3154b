//! Helpers built on pooled key-value handles

mod id;
mod rate;

pub use id::IdGenerator;
pub use rate::{RateDecision, RateLimiter};
