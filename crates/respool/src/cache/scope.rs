//! Cache operations for one `(namespace, name)` resource

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use respool_core::{
    BatchGet, BatchReport, CacheKey, CacheResult, CacheTier, Error, LocalStore, Metrics,
    Operation, PoolKey, RemoteStore, Result, Serializer,
};

use crate::pool::ResourceAdapter;

use super::tiered::TieredCache;

/// Records of one remote resource, addressed by key
///
/// The remote copy of `key` lives under `key` in the store pooled as
/// `(namespace, name)`; the local copy lives under `namespace/name/key`.
pub struct CacheScope<'a, A, L, S, M>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
    L: LocalStore,
    S: Serializer,
    M: Metrics,
{
    cache: &'a TieredCache<A, L, S, M>,
    namespace: String,
    name: String,
}

impl<'a, A, L, S, M> CacheScope<'a, A, L, S, M>
where
    A: ResourceAdapter,
    A::Handle: RemoteStore,
    L: LocalStore,
    S: Serializer,
    M: Metrics,
{
    pub(super) fn new(cache: &'a TieredCache<A, L, S, M>, namespace: String, name: String) -> Self {
        Self {
            cache,
            namespace,
            name,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Composite path of `key` in the local store
    pub fn local_key(&self, key: &str) -> String {
        format!("{}/{}/{}", self.namespace, self.name, key)
    }

    /// Pooled remote handle for this scope
    async fn remote(&self) -> Result<Arc<A::Handle>> {
        self.cache
            .pool
            .acquire(PoolKey::new(self.namespace.as_str(), self.name.as_str()))
            .await
    }

    /// Run a remote call under the configured deadline
    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.cache.config.op_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout)?,
            None => call.await,
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let start = Instant::now();
        let value = self.cache.serializer.deserialize(bytes);
        self.cache
            .metrics
            .record_latency(Operation::Deserialize, start.elapsed());
        value
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let start = Instant::now();
        let bytes = self.cache.serializer.serialize(value);
        self.cache
            .metrics
            .record_latency(Operation::Serialize, start.elapsed());
        bytes
    }

    fn read_local(&self, local_key: &str) -> Option<Vec<u8>> {
        match self.cache.local.get(local_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(key = %local_key, error = %e, "local read failed");
                None
            }
        }
    }

    fn write_local(&self, local_key: &str, bytes: Vec<u8>) {
        if let Err(e) = self.cache.local.set(local_key, bytes) {
            warn!(key = %local_key, error = %e, "local write failed");
        }
    }

    /// Get a value, consulting the local tier first when `use_local`
    ///
    /// Undecodable local bytes fall through to the remote tier. A remote
    /// value that does not decode is an `Error::Deserialization`, never a
    /// miss. A remote hit is copied to the local tier when `use_local`.
    pub async fn get<T>(&self, key: impl CacheKey, use_local: bool) -> Result<CacheResult<T>>
    where
        T: DeserializeOwned,
    {
        let key = key.cache_key();
        let local_key = self.local_key(&key);
        let start = Instant::now();

        if use_local && let Some(bytes) = self.read_local(&local_key) {
            match self.decode(&bytes) {
                Ok(value) => {
                    self.cache.metrics.record_hit(&local_key, CacheTier::Local);
                    self.cache
                        .metrics
                        .record_latency(Operation::Get, start.elapsed());
                    return Ok(CacheResult::Hit(value, CacheTier::Local));
                }
                Err(e) => {
                    debug!(key = %local_key, error = %e, "corrupt local copy, reading remote");
                }
            }
        }

        let store = self.remote().await?;
        let raw = self.bounded(store.get(&key)).await?;
        let result = match raw {
            Some(bytes) => {
                let value = self.decode(&bytes).inspect_err(|e| {
                    warn!(key = %local_key, error = %e, "remote value failed to decode");
                })?;
                if use_local {
                    self.write_local(&local_key, bytes);
                }
                self.cache.metrics.record_hit(&local_key, CacheTier::Remote);
                CacheResult::Hit(value, CacheTier::Remote)
            }
            None => {
                self.cache.metrics.record_miss(&local_key);
                CacheResult::Miss
            }
        };

        self.cache
            .metrics
            .record_latency(Operation::Get, start.elapsed());
        Ok(result)
    }

    /// Store a value remotely with `ttl`, then locally when `use_local`
    ///
    /// A value that fails to serialize is logged and an empty payload is
    /// written in its place, so the previous value is no longer served and
    /// a later `get` reports `Error::Deserialization`. The serialization
    /// error is still returned. A zero or absent `ttl` stores without
    /// expiry. Local write failures are logged only.
    pub async fn set<T>(
        &self,
        key: impl CacheKey,
        value: &T,
        ttl: Option<Duration>,
        use_local: bool,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = key.cache_key();
        match self.encode(value) {
            Ok(bytes) => self.write_remote(&key, bytes, ttl, use_local).await,
            Err(e) => {
                warn!(
                    namespace = %self.namespace,
                    name = %self.name,
                    key = %key,
                    error = %e,
                    "value failed to serialize, overwriting with empty payload"
                );
                if let Err(write) = self.write_remote(&key, Vec::new(), ttl, use_local).await {
                    warn!(key = %key, error = %write, "empty payload write failed");
                }
                Err(e)
            }
        }
    }

    async fn write_remote(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl: Option<Duration>,
        use_local: bool,
    ) -> Result<()> {
        let start = Instant::now();
        let store = self.remote().await?;
        let local_copy = use_local.then(|| bytes.clone());

        self.bounded(store.set(key, bytes, self.cache.jittered(ttl)))
            .await?;
        if let Some(bytes) = local_copy {
            self.write_local(&self.local_key(key), bytes);
        }

        self.cache
            .metrics
            .record_latency(Operation::Set, start.elapsed());
        trace!(namespace = %self.namespace, name = %self.name, key = %key, "cache set");
        Ok(())
    }

    /// Fill `out[i]` for every `keys[i]` found, returning the indices to rebuild
    ///
    /// `out` must be as long as `keys`. Keys not served locally are fetched
    /// in one pipelined remote request. Misses and values that fail to
    /// decode are returned in ascending order and their slots left as is.
    /// Fails only on a length mismatch or a failed batch request.
    pub async fn mget_into<K, T>(
        &self,
        keys: &[K],
        out: &mut [Option<T>],
        use_local: bool,
    ) -> Result<Vec<usize>>
    where
        K: CacheKey,
        T: DeserializeOwned,
    {
        if keys.len() != out.len() {
            return Err(Error::Usage(format!(
                "mget got {} keys but {} output slots",
                keys.len(),
                out.len()
            )));
        }

        let start = Instant::now();
        let keys: Vec<String> = keys.iter().map(CacheKey::cache_key).collect();

        let mut pending = Vec::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            if use_local {
                let local_key = self.local_key(key);
                if let Some(bytes) = self.read_local(&local_key)
                    && let Ok(value) = self.decode::<T>(&bytes)
                {
                    out[index] = Some(value);
                    self.cache.metrics.record_hit(&local_key, CacheTier::Local);
                    continue;
                }
            }
            pending.push(index);
        }

        let mut rebuild = Vec::new();
        if !pending.is_empty() {
            let store = self.remote().await?;
            let batch: Vec<&str> = pending.iter().map(|&i| keys[i].as_str()).collect();
            let mut values = self.bounded(store.get_many(&batch)).await?.into_iter();

            for &index in &pending {
                let local_key = self.local_key(&keys[index]);
                match values.next().flatten() {
                    Some(bytes) => match self.decode::<T>(&bytes) {
                        Ok(value) => {
                            out[index] = Some(value);
                            if use_local {
                                self.write_local(&local_key, bytes);
                            }
                            self.cache.metrics.record_hit(&local_key, CacheTier::Remote);
                        }
                        Err(e) => {
                            debug!(key = %local_key, error = %e, "batch value failed to decode");
                            rebuild.push(index);
                        }
                    },
                    None => {
                        self.cache.metrics.record_miss(&local_key);
                        rebuild.push(index);
                    }
                }
            }
        }

        self.cache
            .metrics
            .record_latency(Operation::MultiGet, start.elapsed());
        Ok(rebuild)
    }

    /// Owned form of [`mget_into`](Self::mget_into)
    pub async fn mget<K, T>(&self, keys: &[K], use_local: bool) -> Result<BatchGet<T>>
    where
        K: CacheKey,
        T: DeserializeOwned,
    {
        let mut values: Vec<Option<T>> = std::iter::repeat_with(|| None).take(keys.len()).collect();
        let rebuild = self.mget_into(keys, &mut values, use_local).await?;
        Ok(BatchGet { values, rebuild })
    }

    /// Store each `values[i]` under `keys[i]`
    ///
    /// Mismatched lengths are an `Error::Usage` and nothing is written.
    /// Otherwise every pair is attempted; failures are logged and reported
    /// without stopping the batch.
    pub async fn mset<K, T>(
        &self,
        keys: &[K],
        values: &[T],
        ttl: Option<Duration>,
        use_local: bool,
    ) -> Result<BatchReport>
    where
        K: CacheKey,
        T: Serialize,
    {
        if keys.len() != values.len() {
            return Err(Error::Usage(format!(
                "mset got {} keys but {} values",
                keys.len(),
                values.len()
            )));
        }

        let start = Instant::now();
        let mut report = BatchReport::default();
        for (index, (key, value)) in keys.iter().zip(values).enumerate() {
            match self.set(key.cache_key(), value, ttl, use_local).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!(
                        namespace = %self.namespace,
                        name = %self.name,
                        key = %key.cache_key(),
                        error = %e,
                        "mset entry failed"
                    );
                    report.failed.push(index);
                }
            }
        }

        self.cache
            .metrics
            .record_latency(Operation::MultiSet, start.elapsed());
        Ok(report)
    }

    /// Read an integer counter
    ///
    /// Counters are decimal text in both tiers.
    pub async fn get_num(&self, key: impl CacheKey, use_local: bool) -> Result<CacheResult<i64>> {
        let key = key.cache_key();
        let local_key = self.local_key(&key);
        let start = Instant::now();

        if use_local
            && let Some(bytes) = self.read_local(&local_key)
            && let Some(value) = parse_decimal(&bytes)
        {
            self.cache.metrics.record_hit(&local_key, CacheTier::Local);
            return Ok(CacheResult::Hit(value, CacheTier::Local));
        }

        let store = self.remote().await?;
        let result = match self.bounded(store.get_num(&key)).await? {
            Some(value) => {
                if use_local {
                    self.write_local(&local_key, value.to_string().into_bytes());
                }
                self.cache.metrics.record_hit(&local_key, CacheTier::Remote);
                CacheResult::Hit(value, CacheTier::Remote)
            }
            None => {
                self.cache.metrics.record_miss(&local_key);
                CacheResult::Miss
            }
        };

        self.cache
            .metrics
            .record_latency(Operation::Get, start.elapsed());
        Ok(result)
    }

    /// Write an integer counter
    pub async fn set_num(
        &self,
        key: impl CacheKey,
        value: i64,
        ttl: Option<Duration>,
        use_local: bool,
    ) -> Result<()> {
        let key = key.cache_key();
        let start = Instant::now();
        let store = self.remote().await?;

        self.bounded(store.set_num(&key, value, self.cache.jittered(ttl)))
            .await?;
        if use_local {
            self.write_local(&self.local_key(&key), value.to_string().into_bytes());
        }

        self.cache
            .metrics
            .record_latency(Operation::Set, start.elapsed());
        Ok(())
    }

    /// Atomically increment a remote counter, returning the new value
    pub async fn incr_num(&self, key: impl CacheKey) -> Result<i64> {
        let key = key.cache_key();
        let start = Instant::now();
        let store = self.remote().await?;
        let value = self.bounded(store.incr(&key)).await?;
        self.cache
            .metrics
            .record_latency(Operation::Incr, start.elapsed());
        Ok(value)
    }

    /// Atomically decrement a remote counter, returning the new value
    pub async fn decr_num(&self, key: impl CacheKey) -> Result<i64> {
        let key = key.cache_key();
        let start = Instant::now();
        let store = self.remote().await?;
        let value = self.bounded(store.decr(&key)).await?;
        self.cache
            .metrics
            .record_latency(Operation::Decr, start.elapsed());
        Ok(value)
    }

    /// Delete the remote copy; local copies age out on their own
    pub async fn delete(&self, key: impl CacheKey) -> Result<bool> {
        let key = key.cache_key();
        let start = Instant::now();
        let store = self.remote().await?;
        let removed = self.bounded(store.delete(&key)).await?;
        self.cache
            .metrics
            .record_latency(Operation::Delete, start.elapsed());
        Ok(removed)
    }
}

fn parse_decimal(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(b"42"), Some(42));
        assert_eq!(parse_decimal(b"-7\n"), Some(-7));
        assert_eq!(parse_decimal(b"forty"), None);
        assert_eq!(parse_decimal(&[0xff, 0xfe]), None);
    }
}
