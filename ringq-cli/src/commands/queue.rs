//! Queue command handlers
//!
//! Push and pop single tasks, print the content of a backup ring.

use super::lookup;
use color_eyre::Result;
use ringq::queue::{BackupQueue, QueueManager};
use ringq::storage::{Keys, Store};
use ringq::Task;
use std::sync::Arc;
use std::time::Duration;

/// Push one task
pub async fn push(
    manager: &QueueManager,
    spec: &str,
    payload: String,
    id: Option<String>,
    task_type: Option<String>,
    unique: bool,
) -> Result<()> {
    let queue = lookup(manager, spec)?;

    let mut builder = Task::builder(queue.name()).payload(payload).unique(unique);
    if let Some(id) = id {
        builder = builder.id(id);
    }
    if let Some(task_type) = task_type {
        builder = builder.task_type(task_type);
    }
    let task = builder.build()?;

    match queue.try_push_task(task).await? {
        Some(task) => println!("Pushed {} to '{}'", task.id, queue.name()),
        None => println!("Rejected: a task with this ID is already queued or in flight on '{}'", queue.name()),
    }
    Ok(())
}

/// Pop one task, print it and finish it
pub async fn pop(manager: &QueueManager, spec: &str, timeout_ms: u64) -> Result<()> {
    let queue = lookup(manager, spec)?;

    let Some(task) = queue
        .try_pop_task_timeout(Some(Duration::from_millis(timeout_ms)))
        .await?
    else {
        println!("Queue '{}' is empty", queue.name());
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&task)?);
    queue.try_finish_task(&task).await?;
    Ok(())
}

/// Print the backup ring of a queue set, head first
pub async fn ring(store: &Arc<dyn Store>, queues: &[String]) -> Result<()> {
    let ring = BackupQueue::new(store.clone(), Keys::backup_queue(queues));
    let entries = ring.snapshot().await?;

    println!("Backup queue: {}", ring.name());
    if entries.is_empty() {
        println!("  (Not initialized)");
        return Ok(());
    }

    for entry in entries {
        match Task::decode(&entry) {
            Ok(task) if task.is_marker_of(ring.name()) => println!("  - <marker>"),
            Ok(task) => println!("  - {}", task.description()),
            Err(_) => println!("  - (undecodable) {}", entry),
        }
    }
    Ok(())
}
