//! MySQL cluster adapter

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use sqlx_core::pool::PoolOptions;
use sqlx_mysql::{MySql, MySqlPool};
use std::time::Duration;
use tracing::debug;

use respool_core::{Error, PoolKey, Result};

use crate::pool::{ResourceAdapter, RolePolicy};

/// Role of the writable cluster member
pub const PRIMARY: &str = "primary";
/// Role of the read-only cluster member
pub const REPLICA: &str = "replica";

const DEFAULT_MAX_OPEN: u32 = 10;

/// Section for one cluster member at `[service, "database", name, role]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlPoolConfig {
    pub dsn: String,
    /// Connections kept open while idle
    #[serde(default)]
    pub max_idle_conns: Option<u32>,
    #[serde(default)]
    pub max_open_conns: Option<u32>,
    /// Whole seconds or a humantime string; zero keeps connections forever
    #[serde(default, deserialize_with = "lifetime")]
    pub conn_max_lifetime: Option<Duration>,
}

fn lifetime<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lifetime {
        Seconds(u64),
        Text(#[serde(with = "humantime_serde")] Duration),
    }

    let lifetime = match Option::<Lifetime>::deserialize(deserializer)? {
        Some(Lifetime::Seconds(secs)) => Duration::from_secs(secs),
        Some(Lifetime::Text(duration)) => duration,
        None => return Ok(None),
    };
    Ok(Some(lifetime).filter(|d| !d.is_zero()))
}

/// Connections to hold while priming, bounded by the pool maximum
fn prime_target(requested: usize, max_connections: u32) -> usize {
    requested.min(max_connections as usize)
}

impl SqlPoolConfig {
    /// Pool options with the configured bounds
    pub fn pool_options(&self) -> PoolOptions<MySql> {
        let max_open = self.max_open_conns.unwrap_or(DEFAULT_MAX_OPEN).max(1);
        let min_idle = self.max_idle_conns.unwrap_or(0).min(max_open);

        let mut options = PoolOptions::<MySql>::new()
            .max_connections(max_open)
            .min_connections(min_idle);
        if let Some(lifetime) = self.conn_max_lifetime {
            options = options.max_lifetime(lifetime);
        }
        options
    }
}

/// Builds `MySqlPool` handles for `primary` / `replica` cluster members
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlAdapter;

#[async_trait]
impl ResourceAdapter for SqlAdapter {
    type Config = SqlPoolConfig;
    type Handle = MySqlPool;

    const KIND: &'static str = "mysql";
    const SECTION: &'static str = "database";
    const ROLE: RolePolicy = RolePolicy::Required;

    async fn connect(&self, key: &PoolKey, config: &SqlPoolConfig) -> Result<MySqlPool> {
        let pool = config
            .pool_options()
            .connect(&config.dsn)
            .await
            .map_err(|e| Error::construction(key, e))?;

        sqlx_core::query::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| Error::construction(key, e))?;

        debug!(key = %key, dsn = %mask_password(&config.dsn), "database connection verified");
        Ok(pool)
    }

    async fn close(&self, handle: &MySqlPool) -> Result<()> {
        handle.close().await;
        Ok(())
    }

    async fn prime(&self, handle: &MySqlPool, connections: usize) -> Result<usize> {
        let connections = prime_target(connections, handle.options().get_max_connections());
        let held = futures_util::future::join_all((0..connections).map(|_| handle.acquire())).await;
        let opened = held.iter().filter(|conn| conn.is_ok()).count();
        if opened == 0 && connections > 0 {
            if let Some(Err(e)) = held.into_iter().find(Result::is_err) {
                return Err(Error::Transport(e.to_string()));
            }
        }
        Ok(opened)
    }

    fn describe(config: &SqlPoolConfig) -> String {
        format!(
            "dsn={} max_open={:?} max_idle={:?} max_lifetime={:?}",
            mask_password(&config.dsn),
            config.max_open_conns,
            config.max_idle_conns,
            config.conn_max_lifetime
        )
    }
}

/// Masks the password in a DSN for logging
fn mask_password(dsn: &str) -> String {
    if let Some(at_pos) = dsn.rfind('@')
        && let Some(colon_pos) = dsn[..at_pos].rfind(':')
    {
        let scheme_end = dsn.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &dsn[..colon_pos], &dsn[at_pos..]);
        }
    }
    dsn.to_string()
}
