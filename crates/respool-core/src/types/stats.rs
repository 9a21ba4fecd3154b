//! Store statistics

/// Counters kept by the in-process stores
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    /// Number of hits
    pub hits: u64,
    /// Number of misses
    pub misses: u64,
    /// Number of write operations
    pub writes: u64,
    /// Number of delete operations
    pub deletes: u64,
    /// Number of evictions (capacity or expiry)
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Approximate memory usage in bytes
    pub memory_bytes: usize,
}

impl StoreStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let stats = StoreStats::default();
        assert_eq!(stats.total_requests(), 0);
        assert_eq!(stats.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = StoreStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_ratio() - 0.8).abs() < f64::EPSILON);
        assert_eq!(stats.total_requests(), 100);
    }
}
