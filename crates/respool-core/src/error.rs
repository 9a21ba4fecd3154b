//! Error types for pool and cache operations

use thiserror::Error;

/// Main error type for all pool and cache operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Configuration section missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Handle construction failed (store unreachable, handshake rejected)
    #[error("failed to construct {key}: {reason}")]
    Construction { key: String, reason: String },

    /// Caller misuse, e.g. mismatched batch lengths
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O failure against an already-live resource
    #[error("transport error: {0}")]
    Transport(String),

    /// Transient failure of a configuration watch
    #[error("watch error: {0}")]
    Watch(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization of a present value failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Local store rejected an operation
    #[error("local store error: {0}")]
    LocalStore(String),

    /// Operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    /// The owning pool manager has been shut down
    #[error("pool manager is shut down")]
    Shutdown,
}

impl Error {
    /// Shorthand for a construction failure on `key`
    pub fn construction(key: impl ToString, reason: impl ToString) -> Self {
        Error::Construction {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error came from the store rather than the caller or config
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout)
    }
}

/// Result type alias for pool and cache operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("missing section svc/redis/main".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: missing section svc/redis/main"
        );

        let err = Error::construction("redis:svc/main", "connection refused");
        assert_eq!(
            err.to_string(),
            "failed to construct redis:svc/main: connection refused"
        );

        let err = Error::Usage("len is not eq".to_string());
        assert_eq!(err.to_string(), "usage error: len is not eq");
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::Transport("reset".into()).is_transport());
        assert!(Error::Timeout.is_transport());
        assert!(!Error::Usage("x".into()).is_transport());
        assert!(!Error::Shutdown.is_transport());
    }
}
