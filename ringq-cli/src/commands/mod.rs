//! Command handlers

pub mod lock;
pub mod monitor;
pub mod queue;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use ringq::config::{QueueManagerConfig, QueueSpec};
use ringq::queue::{QueueManager, TaskQueue};
use ringq::storage::{RedisStore, Store};
use std::sync::Arc;

/// Connect to the Redis server at `url`
pub async fn connect(url: &str) -> Result<Arc<dyn Store>> {
    let store = RedisStore::from_url(url).await?;
    tracing::debug!("Connected to {}", url);
    Ok(Arc::new(store))
}

/// Build the queue manager for `queue_set`, or for `fallback` when the set is empty
pub async fn manager(store: &Arc<dyn Store>, queue_set: &[String], fallback: &[String]) -> Result<QueueManager> {
    let specs = if queue_set.is_empty() { fallback } else { queue_set };
    let manager = QueueManager::new(store.clone(), QueueManagerConfig::new(specs)).await?;
    Ok(manager)
}

/// Find the queue named by `spec` in the manager
pub fn lookup<'a>(manager: &'a QueueManager, spec: &str) -> Result<&'a TaskQueue> {
    let name = QueueSpec::parse(spec)?.name;
    manager
        .task_queue(&name)
        .ok_or_else(|| eyre!("Queue '{}' is not part of the configured queue set", name))
}
