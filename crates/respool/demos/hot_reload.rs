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

    let path = std::env::temp_dir().join("respool-hot-reload.json");
    tokio::fs::write(&path, r#"{"orders":{"memory_kv":{"primary":{}}}}"#).await?;

    let source = Arc::new(FileConfigSource::open(&path).await?);
    let manager = PoolManager::new(source)
        .with_settings(PoolSettings::default().grace_period(Duration::from_secs(1)));
    let pool = manager.pool(MemoryKvAdapter);

    let before = pool.acquire(("orders", "primary")).await?;
    println!("watching {}", path.display());

    tokio::fs::write(
        &path,
        r#"{"orders":{"memory_kv":{"primary":{"max_entries":10}}}}"#,
    )
    .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let after = pool.acquire(("orders", "primary")).await?;
    println!("handle replaced: {}", !Arc::ptr_eq(&before, &after));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    println!("old handle closed: {}", before.is_closed());

    manager.shutdown().await;
    tokio::fs::remove_file(&path).await?;
    Ok(())
}
