//! # ringq
//!
//! ringq is a Redis-list task queue with an at-least-once SAFE mode and a
//! distributed lock.
//!
//! ## Features
//!
//! - Named queues backed by plain Redis lists, optional per-task uniqueness
//! - SAFE mode: every dequeued task is shadowed into a backup ring until it
//!   is finished
//! - Backup ring monitor: retries stuck tasks at the front of their queue,
//!   dead-letters them once retries run out
//! - SETNX / GETSET distributed lock with expiry-based fencing
//! - Prometheus counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ringq::config::{MonitorConfig, QueueManagerConfig};
//! use ringq::monitor::{BackupQueueMonitor, LoggingPipeline};
//! use ringq::queue::QueueManager;
//! use ringq::storage::RedisStore;
//! use ringq::Task;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RedisStore::from_url("redis://localhost:6379").await?);
//!
//!     // Producer and consumer share the queue manager configuration
//!     let manager = QueueManager::new(
//!         store.clone(),
//!         QueueManagerConfig::new(&["orders:safe"]).with_alive_timeout(Duration::from_secs(600)),
//!     )
//!     .await?;
//!     let orders = manager.task_queue("orders").expect("configured above");
//!
//!     let task = Task::builder("orders").task_type("charge").payload("42").build()?;
//!     orders.push_task(task).await;
//!
//!     if let Some(task) = orders.pop_task().await {
//!         // ... run the task ...
//!         orders.finish_task(&task).await;
//!     }
//!
//!     // Somewhere else, periodically
//!     let monitor = BackupQueueMonitor::new(
//!         store,
//!         MonitorConfig::new(manager.backup_queue_name())
//!             .with_alive_timeout(Duration::from_secs(600))
//!             .with_protected_timeout(Duration::from_secs(60)),
//!     )?
//!     .pipeline(LoggingPipeline);
//!     monitor.monitor().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Public module exports
pub mod config;
pub mod error;
pub mod task;

// Storage layer
pub mod storage;

// Distributed lock
pub mod lock;

// Queues and the backup ring
pub mod queue;

// Backup ring monitor
pub mod monitor;

// Processor
pub mod processor;

// Worker and monitor loops
pub mod server;

// Observability
pub mod observability;

// Re-export common types
pub use error::{Error, Result};
pub use task::{Task, TaskBuilder, TaskState, TaskStatus};
