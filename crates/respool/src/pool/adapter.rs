//! Resource-kind capability trait

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;

use respool_core::{Error, PoolKey, Result};

/// Whether keys for a resource kind carry a role segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePolicy {
    /// Keys must not have a role
    Forbidden,
    /// Keys must name a role (cluster member or topic)
    Required,
}

impl RolePolicy {
    /// Validate a key against this policy
    pub fn check(&self, kind: &str, key: &PoolKey) -> Result<()> {
        match (self, &key.role) {
            (RolePolicy::Forbidden, Some(role)) => Err(Error::Usage(format!(
                "{kind} pool does not take a role, got {role:?} for {key}"
            ))),
            (RolePolicy::Required, None) => {
                Err(Error::Usage(format!("{kind} pool requires a role for {key}")))
            }
            (RolePolicy::Required, Some(role)) if role.is_empty() => {
                Err(Error::Usage(format!("{kind} pool requires a non-empty role for {key}")))
            }
            _ => Ok(()),
        }
    }
}

/// How a resource kind is configured, built, verified and torn down
///
/// One [`ResourcePool`](crate::ResourcePool) state machine serves every
/// kind; the adapter supplies only the kind-specific pieces.
#[async_trait]
pub trait ResourceAdapter: Send + Sync + 'static {
    /// Typed configuration decoded from the section at the key's path
    type Config: DeserializeOwned + fmt::Debug + Send + Sync;

    /// Shared client handle
    type Handle: Send + Sync + 'static;

    /// Label used in logs and metrics
    const KIND: &'static str;

    /// Configuration section name, the second path segment
    const SECTION: &'static str;

    /// Role policy for keys
    const ROLE: RolePolicy;

    /// Build a handle with the configured bounds and verify it is reachable
    async fn connect(&self, key: &PoolKey, config: &Self::Config) -> Result<Self::Handle>;

    /// Release the handle's resources
    async fn close(&self, handle: &Self::Handle) -> Result<()>;

    /// Open up to `connections` connections ahead of use
    ///
    /// Returns how many were opened.
    async fn prime(&self, _handle: &Self::Handle, _connections: usize) -> Result<usize> {
        Ok(0)
    }

    /// Short description of the configured bounds, for logs
    fn describe(_config: &Self::Config) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_policy() {
        let plain = PoolKey::new("orders", "main");
        let with_role = PoolKey::new("orders", "main").with_role("primary");

        assert!(RolePolicy::Forbidden.check("kv", &plain).is_ok());
        assert!(matches!(
            RolePolicy::Forbidden.check("kv", &with_role),
            Err(Error::Usage(_))
        ));

        assert!(RolePolicy::Required.check("sql", &with_role).is_ok());
        assert!(matches!(
            RolePolicy::Required.check("sql", &plain),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            RolePolicy::Required.check("sql", &PoolKey::new("orders", "main").with_role("")),
            Err(Error::Usage(_))
        ));
    }
}
