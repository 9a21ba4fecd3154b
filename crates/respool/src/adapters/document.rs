//! Document store adapter over a pluggable driver

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use respool_core::{Error, PoolKey, Result};

use crate::pool::{ResourceAdapter, RolePolicy};

fn default_max_conn_idle_time() -> Duration {
    Duration::from_secs(600)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_database() -> String {
    "local".to_string()
}

/// Section at `[service, "mongo", name]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentPoolConfig {
    /// Connection URI
    pub addr: String,
    #[serde(default)]
    pub min_pool_size: Option<u32>,
    #[serde(default)]
    pub max_pool_size: Option<u32>,
    #[serde(default = "default_max_conn_idle_time", with = "humantime_serde")]
    pub max_conn_idle_time: Duration,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Database handed out with the client
    #[serde(default = "default_database")]
    pub database: String,
}

/// Client library for a document store
///
/// Keeps the pool independent of any one driver crate; implement it over
/// the driver in use.
#[async_trait]
pub trait DocumentDriver: Send + Sync + 'static {
    type Client: Send + Sync + 'static;

    /// Create a client with the configured bounds
    async fn connect(&self, app_name: &str, config: &DocumentPoolConfig) -> Result<Self::Client>;

    /// Round trip to the server
    async fn ping(&self, client: &Self::Client) -> Result<()>;

    /// Disconnect the client
    async fn disconnect(&self, client: &Self::Client) -> Result<()>;
}

/// Live client plus the database it was configured for
#[derive(Debug)]
pub struct DocumentClient<C> {
    pub client: C,
    pub database: String,
}

/// Builds [`DocumentClient`] handles from `[service, "mongo", name]`
#[derive(Debug, Clone, Default)]
pub struct DocumentAdapter<D> {
    driver: D,
}

impl<D: DocumentDriver> DocumentAdapter<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[async_trait]
impl<D: DocumentDriver> ResourceAdapter for DocumentAdapter<D> {
    type Config = DocumentPoolConfig;
    type Handle = DocumentClient<D::Client>;

    const KIND: &'static str = "mongo";
    const SECTION: &'static str = "mongo";
    const ROLE: RolePolicy = RolePolicy::Forbidden;

    async fn connect(
        &self,
        key: &PoolKey,
        config: &DocumentPoolConfig,
    ) -> Result<DocumentClient<D::Client>> {
        let limit = config.connect_timeout;
        let client = tokio::time::timeout(limit, self.driver.connect(&key.service, config))
            .await
            .map_err(|_| Error::construction(key, format!("connect timed out after {limit:?}")))??;

        if let Err(e) = tokio::time::timeout(limit, self.driver.ping(&client))
            .await
            .map_err(|_| Error::construction(key, format!("ping timed out after {limit:?}")))
            .and_then(|ping| ping)
        {
            // Do not leak the half-built client
            let _ = self.driver.disconnect(&client).await;
            return Err(e);
        }

        Ok(DocumentClient {
            client,
            database: config.database.clone(),
        })
    }

    async fn close(&self, handle: &DocumentClient<D::Client>) -> Result<()> {
        self.driver.disconnect(&handle.client).await
    }

    fn describe(config: &DocumentPoolConfig) -> String {
        format!(
            "database={} min_pool={:?} max_pool={:?} idle={:?}",
            config.database, config.min_pool_size, config.max_pool_size, config.max_conn_idle_time
        )
    }
}
