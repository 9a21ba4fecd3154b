//! Registry entry for one handle generation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// One live or draining generation of a pooled handle
pub(crate) struct PoolEntry<H> {
    pub(crate) generation: u64,
    pub(crate) handle: Arc<H>,
    /// Stops this generation's watch task when the entry is retired early
    pub(crate) watch_stop: CancellationToken,
    closed: AtomicBool,
}

impl<H> PoolEntry<H> {
    pub(crate) fn new(generation: u64, handle: H, watch_stop: CancellationToken) -> Self {
        Self {
            generation,
            handle: Arc::new(handle),
            watch_stop,
            closed: AtomicBool::new(false),
        }
    }

    /// Claim the right to close the handle; true exactly once
    pub(crate) fn claim_close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_close_once() {
        let entry = PoolEntry::new(1, "handle", CancellationToken::new());
        assert!(!entry.is_closed());
        assert!(entry.claim_close());
        assert!(!entry.claim_close());
        assert!(entry.is_closed());
    }
}
