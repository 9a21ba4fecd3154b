use respool::TracingMetrics;
use respool::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Order {
    id: u64,
    status: String,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let source = Arc::new(MemoryConfigSource::new(serde_json::json!({
        "orders": { "memory_kv": { "primary": { "max_entries": 1000 } } }
    })));
    let manager = PoolManager::new(source);

    let cache = TieredCache::with_serializer_and_metrics(
        manager.pool(MemoryKvAdapter),
        MemoryLocalStore::new(MemoryLocalConfig::with_capacity(100)),
        JsonSerializer,
        TracingMetrics::new().with_service_name("orders"),
        TieredCacheConfig::with_timeout(Duration::from_millis(200)).ttl_jitter(0.1),
    );
    let orders = cache.scope("orders", "primary");

    orders
        .set(
            "order:42",
            &Order {
                id: 42,
                status: "paid".into(),
            },
            Some(Duration::from_secs(60)),
            true,
        )
        .await?;

    match orders.get::<Order>("order:42", true).await? {
        CacheResult::Hit(order, tier) => println!("order:42 = {order:?} ({tier:?})"),
        CacheResult::Miss => println!("order:42 missing"),
    }

    let batch = orders.mget::<_, Order>(&["order:41", "order:42"], true).await?;
    println!("rebuild from the database: {:?}", batch.rebuild);

    println!("visits = {}", orders.incr_num("visits").await?);

    manager.shutdown().await;
    Ok(())
}
