//! Pool entry identity

use std::fmt;

/// Identity of one pooled resource: `(service, name[, role])`
///
/// `service` selects the configuration tree, `name` the logical resource
/// and `role` an optional sub-cluster (database primary/replica) or
/// sub-resource (broker topic). The resource kind is carried by the pool
/// the key is used with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub service: String,
    pub name: String,
    pub role: Option<String>,
}

impl PoolKey {
    /// Create a key without a role
    pub fn new(service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            role: None,
        }
    }

    /// Attach a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Configuration path segments for `section`
    pub fn config_path(&self, section: &str) -> ConfigPath {
        let mut path = ConfigPath::new([self.service.as_str(), section, self.name.as_str()]);
        if let Some(role) = &self.role {
            path = path.child(role);
        }
        path
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Some(role) => write!(f, "{}/{}.{}", self.service, self.name, role),
            None => write!(f, "{}/{}", self.service, self.name),
        }
    }
}

impl<S: Into<String>, N: Into<String>> From<(S, N)> for PoolKey {
    fn from((service, name): (S, N)) -> Self {
        PoolKey::new(service, name)
    }
}

impl<S: Into<String>, N: Into<String>, R: Into<String>> From<(S, N, R)> for PoolKey {
    fn from((service, name, role): (S, N, R)) -> Self {
        PoolKey::new(service, name).with_role(role)
    }
}

/// Slash-separated path into a configuration tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    /// Build a path from segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(segments.into_iter().map(|s| s.as_ref().to_string()).collect())
    }

    /// Path extended by one segment
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// Path without its last segment
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Resolve this path inside a JSON tree
    pub fn lookup<'a>(&self, tree: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        self.0.iter().try_fold(tree, |node, segment| node.get(segment))
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_from_tuples() {
        let key: PoolKey = ("orders", "primary").into();
        assert_eq!(key.to_string(), "orders/primary");
        assert!(key.role.is_none());

        let key: PoolKey = ("orders", "main", "replica").into();
        assert_eq!(key.role.as_deref(), Some("replica"));
        assert_eq!(key.to_string(), "orders/main.replica");
    }

    #[test]
    fn test_config_path() {
        let key = PoolKey::new("orders", "main").with_role("primary");
        let path = key.config_path("database");
        assert_eq!(path.to_string(), "orders/database/main/primary");
        assert_eq!(
            path.parent().map(|p| p.to_string()),
            Some("orders/database/main".to_string())
        );
        assert!(ConfigPath::default().parent().is_none());
    }

    #[test]
    fn test_lookup() {
        let tree = serde_json::json!({
            "orders": { "redis": { "primary": { "addrs": ["127.0.0.1:6379"] } } }
        });
        let path = PoolKey::new("orders", "primary").config_path("redis");
        let node = path.lookup(&tree).unwrap();
        assert_eq!(node["addrs"][0], "127.0.0.1:6379");

        let missing = PoolKey::new("orders", "other").config_path("redis");
        assert!(missing.lookup(&tree).is_none());
    }
}
