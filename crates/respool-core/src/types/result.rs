//! Cache lookup and batch result types

use crate::CacheTier;

/// Result of a single cache lookup
///
/// A miss is a normal outcome telling the caller to rebuild from the
/// source of truth; infrastructure failures are reported as `Err` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Value found, with the tier that served it
    Hit(T, CacheTier),
    /// No value present
    Miss,
}

impl<T> CacheResult<T> {
    /// Check if this is a hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(..))
    }

    /// Check if this is a miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheResult::Miss)
    }

    /// Tier that served the hit
    pub fn tier(&self) -> Option<CacheTier> {
        match self {
            CacheResult::Hit(_, tier) => Some(*tier),
            CacheResult::Miss => None,
        }
    }

    /// Extract the value, consuming the result
    pub fn value(self) -> Option<T> {
        match self {
            CacheResult::Hit(value, _) => Some(value),
            CacheResult::Miss => None,
        }
    }

    /// Map the value if present
    pub fn map<U, F>(self, f: F) -> CacheResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheResult::Hit(value, tier) => CacheResult::Hit(f(value), tier),
            CacheResult::Miss => CacheResult::Miss,
        }
    }
}

/// Owned result of a batch lookup
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGet<T> {
    /// One slot per requested key, in request order
    pub values: Vec<Option<T>>,
    /// Indices that missed or failed to decode, ascending
    pub rebuild: Vec<usize>,
}

impl<T> BatchGet<T> {
    /// Whether every key was served
    pub fn is_complete(&self) -> bool {
        self.rebuild.is_empty()
    }
}

/// Outcome of a best-effort batch write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Number of pairs written
    pub written: usize,
    /// Indices whose write failed, ascending
    pub failed: Vec<usize>,
}

impl BatchReport {
    /// Whether every pair was written
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit() {
        let result = CacheResult::Hit(42, CacheTier::Remote);

        assert!(result.is_hit());
        assert!(!result.is_miss());
        assert_eq!(result.tier(), Some(CacheTier::Remote));
        assert_eq!(result.value(), Some(42));
    }

    #[test]
    fn test_miss() {
        let result: CacheResult<i32> = CacheResult::Miss;

        assert!(!result.is_hit());
        assert!(result.is_miss());
        assert!(result.tier().is_none());
        assert!(result.value().is_none());
    }

    #[test]
    fn test_map() {
        let result = CacheResult::Hit(21, CacheTier::Local);
        assert_eq!(result.map(|v| v * 2), CacheResult::Hit(42, CacheTier::Local));
    }

    #[test]
    fn test_batch_completion() {
        let batch = BatchGet::<u8> {
            values: vec![None, Some(1)],
            rebuild: vec![0],
        };
        assert!(!batch.is_complete());
        assert!(BatchReport::default().is_complete());
    }
}
