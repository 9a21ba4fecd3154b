use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{Cmd, FromRedisValue, Pipeline, RedisResult};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use respool_core::{Error, RemoteStore, Result};

use super::config::RedisStoreConfig;

/// Largest PX value sent; the server rejects deadlines past `i64` millis
const MAX_EXPIRY_MILLIS: u64 = (i64::MAX / 2) as u64;

#[derive(Clone)]
enum Backend {
    /// bb8 pool against one standalone server
    Standalone(Pool<RedisConnectionManager>),
    /// Multiplexed cluster connection, routed by key slot
    Cluster(ClusterConnection),
}

/// Redis-backed [`RemoteStore`]
///
/// Standalone servers are reached through a bb8 pool; a cluster through
/// the cluster client, which follows `MOVED`/`ASK` redirects. Cloning
/// shares the same connections and closed flag.
#[derive(Clone)]
pub struct RedisRemoteStore {
    backend: Backend,
    config: RedisStoreConfig,
    addr: String,
    closed: Arc<AtomicBool>,
}

impl RedisRemoteStore {
    /// Connect to the cluster, or to the first standalone address that
    /// answers PING
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let urls = config.urls();
        if urls.is_empty() {
            return Err(Error::Configuration("no redis address given".to_string()));
        }
        if config.is_cluster() {
            return Self::connect_cluster(config, urls).await;
        }

        let mut failures = Vec::with_capacity(urls.len());
        for url in urls {
            match Self::connect_one(&config, &url).await {
                Ok(pool) => {
                    tracing::debug!(addr = %url, pool_size = config.pool_size, "redis pool ready");
                    return Ok(Self {
                        backend: Backend::Standalone(pool),
                        config,
                        addr: url,
                        closed: Arc::new(AtomicBool::new(false)),
                    });
                }
                Err(e) => {
                    tracing::warn!(addr = %url, error = %e, "redis address unreachable");
                    failures.push(format!("{url}: {e}"));
                }
            }
        }

        Err(Error::Transport(failures.join("; ")))
    }

    async fn connect_cluster(config: RedisStoreConfig, urls: Vec<String>) -> Result<Self> {
        let addr = urls.join(",");
        let mut builder =
            ClusterClient::builder(urls).connection_timeout(config.connection_timeout);
        if config.max_retries > 0 {
            builder = builder.retries(config.max_retries);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mut conn = tokio::time::timeout(config.connection_timeout, client.get_async_connection())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::Transport(e.to_string()))?;
        ping(&mut conn).await?;

        tracing::debug!(addr = %addr, "redis cluster connection ready");
        Ok(Self {
            backend: Backend::Cluster(conn),
            config,
            addr,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn connect_one(
        config: &RedisStoreConfig,
        url: &str,
    ) -> Result<Pool<RedisConnectionManager>> {
        let manager =
            RedisConnectionManager::new(url).map_err(|e| Error::Configuration(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(config.min_idle)
            .max_lifetime(config.max_lifetime)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        ping(&mut *conn).await?;
        drop(conn);

        Ok(pool)
    }

    /// Address, or comma-separated seed nodes, the store is connected to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether commands go through the cluster client
    pub fn is_cluster(&self) -> bool {
        matches!(self.backend, Backend::Cluster(_))
    }

    /// Mark the store closed; connections are released once every clone
    /// is dropped
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Transport("store is closed".to_string()));
        }
        Ok(())
    }

    /// Open up to `n` pooled connections, never more than the pool holds
    ///
    /// A cluster connection is multiplexed; it is verified with one PING.
    pub async fn prime(&self, n: usize) -> Result<usize> {
        let pool = match &self.backend {
            Backend::Standalone(pool) => pool,
            Backend::Cluster(conn) => {
                if n == 0 {
                    return Ok(0);
                }
                self.ensure_open()?;
                ping(&mut conn.clone()).await?;
                return Ok(1);
            }
        };

        let n = n.min(self.config.pool_size.max(1) as usize);
        let mut held = Vec::with_capacity(n);
        for _ in 0..n {
            match self.connection(pool).await {
                Ok(conn) => held.push(conn),
                Err(e) if held.is_empty() => return Err(e),
                Err(_) => break,
            }
        }
        Ok(held.len())
    }

    /// Get connection from pool, retrying checkout failures
    async fn connection<'a>(
        &self,
        pool: &'a Pool<RedisConnectionManager>,
    ) -> Result<PooledConnection<'a, RedisConnectionManager>> {
        self.ensure_open()?;

        let mut attempt = 0;
        loop {
            match pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(addr = %self.addr, attempt, error = %e, "retrying redis checkout");
                }
                Err(e) => return Err(Error::Transport(e.to_string())),
            }
        }
    }

    /// Run a single command on whichever backend is in use
    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        match &self.backend {
            Backend::Standalone(pool) => {
                let mut conn = self.connection(pool).await?;
                self.bounded(cmd.query_async(&mut *conn)).await
            }
            Backend::Cluster(conn) => {
                self.ensure_open()?;
                let mut conn = conn.clone();
                self.bounded(cmd.query_async(&mut conn)).await
            }
        }
    }

    /// Run a command under the configured command timeout
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let outcome = match self.config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout)?,
            None => fut.await,
        };
        outcome.map_err(|e| Error::Transport(e.to_string()))
    }

    fn write_cmd(key: &str, value: impl redis::ToRedisArgs, ttl: Option<Duration>) -> Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ms) = expiry_millis(ttl) {
            cmd.arg("PX").arg(ms);
        }
        cmd
    }
}

async fn ping(conn: &mut impl redis::aio::ConnectionLike) -> Result<()> {
    let pong: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    if pong != "PONG" {
        return Err(Error::Transport(format!("unexpected PING reply {pong:?}")));
    }
    Ok(())
}

/// PX value for `ttl`; zero and out-of-range durations store without expiry
fn expiry_millis(ttl: Option<Duration>) -> Option<u64> {
    let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
    u64::try_from(ttl.as_millis())
        .ok()
        .filter(|ms| *ms <= MAX_EXPIRY_MILLIS)
        .map(|ms| ms.max(1))
}

#[async_trait]
impl RemoteStore for RedisRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.query(&Self::write_cmd(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: usize = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCRBY").arg(key).arg(1)).await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("DECRBY").arg(key).arg(1)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        match expiry_millis(Some(ttl)) {
            Some(ms) => {
                let set: i64 = self.query(redis::cmd("PEXPIRE").arg(key).arg(ms)).await?;
                Ok(set == 1)
            }
            None => {
                let _: i64 = self.query(redis::cmd("PERSIST").arg(key)).await?;
                let exists: i64 = self.query(redis::cmd("EXISTS").arg(key)).await?;
                Ok(exists == 1)
            }
        }
    }

    async fn get_num(&self, key: &str) -> Result<Option<i64>> {
        let raw = self.get(key).await?;
        raw.map(|bytes| {
            std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| text.trim().parse::<i64>().ok())
                .ok_or_else(|| Error::Deserialization(format!("{key}: not an integer")))
        })
        .transpose()
    }

    async fn set_num(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
        self.query(&Self::write_cmd(key, value, ttl)).await
    }

    /// Standalone servers get one pipeline of GETs; a cluster gets MGET,
    /// which the cluster client splits by slot
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        match &self.backend {
            Backend::Standalone(pool) => {
                let mut pipe = Pipeline::new();
                for key in keys {
                    pipe.get(*key);
                }
                let mut conn = self.connection(pool).await?;
                self.bounded(pipe.query_async::<Vec<Option<Vec<u8>>>>(&mut *conn))
                    .await
            }
            Backend::Cluster(_) => {
                let mut cmd = redis::cmd("MGET");
                for key in keys {
                    cmd.arg(*key);
                }
                self.query(&cmd).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_millis() {
        assert_eq!(expiry_millis(None), None);
        assert_eq!(expiry_millis(Some(Duration::ZERO)), None);
        assert_eq!(expiry_millis(Some(Duration::from_secs(60))), Some(60_000));
        assert_eq!(expiry_millis(Some(Duration::from_micros(10))), Some(1));
    }

    #[test]
    fn test_huge_expiry_is_persistent() {
        assert_eq!(expiry_millis(Some(Duration::MAX)), None);
        assert_eq!(
            expiry_millis(Some(Duration::from_millis(MAX_EXPIRY_MILLIS))),
            Some(MAX_EXPIRY_MILLIS)
        );
        assert_eq!(
            expiry_millis(Some(Duration::from_millis(MAX_EXPIRY_MILLIS + 1))),
            None
        );
    }

    #[test]
    fn test_write_cmd_args() {
        let with_ttl = RedisRemoteStore::write_cmd("k", 7i64, Some(Duration::from_secs(2)));
        assert_eq!(with_ttl.args_iter().count(), 5);

        let persistent = RedisRemoteStore::write_cmd("k", 7i64, Some(Duration::MAX));
        assert_eq!(persistent.args_iter().count(), 3);
    }

    #[tokio::test]
    async fn test_connect_without_addrs() {
        let config = RedisStoreConfig::new(Vec::<String>::new());
        let err = RedisRemoteStore::connect(config).await.err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
