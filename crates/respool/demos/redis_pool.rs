use respool::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    println!("Connecting to Redis at {addr}");

    let source = Arc::new(MemoryConfigSource::new(serde_json::json!({
        "orders": {
            "redis": {
                "primary": { "addrs": [addr], "pool_size": 5, "read_timeout": "500ms" }
            }
        }
    })));
    let manager = PoolManager::new(source);
    let redis = manager.pool(RedisAdapter);

    let report = redis.prewarm("orders", &[]).await?;
    if !report.is_complete() {
        for (key, error) in &report.failed {
            println!("Could not warm {key}: {error}");
        }
        println!("Skipping demo (is Redis running?)");
        return Ok(());
    }
    println!("Warmed {} pool(s), {} connection(s)", report.warmed.len(), report.primed);

    let cache = TieredCache::new(redis, MemoryLocalStore::with_defaults());
    let orders = cache.scope("orders", "primary");
    orders
        .set("hello", &"world", Some(Duration::from_secs(300)), true)
        .await?;
    if let CacheResult::Hit(value, tier) = orders.get::<String>("hello", false).await? {
        println!("hello = {value} ({tier:?})");
    }

    manager.shutdown().await;
    Ok(())
}
