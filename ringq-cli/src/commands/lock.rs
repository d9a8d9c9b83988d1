//! Lock command handler

use color_eyre::Result;
use ringq::config::LockConfig;
use ringq::lock::DistributedLock;
use ringq::storage::Store;
use std::sync::Arc;
use std::time::Duration;

/// Acquire `key`, hold it for `hold_ms`, then release it
pub async fn hold(store: &Arc<dyn Store>, key: &str, hold_ms: u64) -> Result<()> {
    let hold = Duration::from_millis(hold_ms);
    let config = LockConfig::default().with_expiry(hold.max(Duration::from_secs(1)) * 2);
    let mut lock = DistributedLock::new(store.clone(), key, config)?;

    if !lock.acquire().await? {
        println!("Could not acquire lock '{}' within {:?}", key, config.acquire_timeout);
        return Ok(());
    }

    println!("Acquired lock '{}' as {}", key, lock.owner());
    tokio::time::sleep(hold).await;
    lock.release().await?;
    println!("Released lock '{}'", key);
    Ok(())
}
