//! Server module
//!
//! Long-running loops built on the library: [`Worker`] consumes queues and
//! [`MonitorRunner`] drives the backup ring monitor on a schedule.
//!
//! # Example
//!
//! ```rust,no_run
//! use ringq::config::{MonitorConfig, QueueManagerConfig};
//! use ringq::monitor::{BackupQueueMonitor, LoggingPipeline};
//! use ringq::processor::{Handler, Mux};
//! use ringq::queue::QueueManager;
//! use ringq::server::{MonitorRunner, MonitorRunnerConfig, Worker, WorkerConfig};
//! use ringq::storage::RedisStore;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # struct MyHandler;
//! # #[async_trait]
//! # impl Handler for MyHandler {
//! #     async fn handle(&self, task: &ringq::Task) -> ringq::Result<()> {
//! #         Ok(())
//! #     }
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RedisStore::from_url("redis://localhost:6379").await?);
//! let manager = QueueManager::new(store.clone(), QueueManagerConfig::new(&["orders:safe"])).await?;
//!
//! let mut mux = Mux::new();
//! mux.handle("order:charge", MyHandler);
//! let worker = Worker::new(manager.queues().to_vec(), Arc::new(mux), WorkerConfig::default())?;
//!
//! let monitor = BackupQueueMonitor::new(
//!     store,
//!     MonitorConfig::new(manager.backup_queue_name())
//!         .with_protected_timeout(Duration::from_secs(60)),
//! )?
//! .pipeline(LoggingPipeline);
//! let runner = MonitorRunner::new(monitor, MonitorRunnerConfig::default())?;
//!
//! tokio::join!(worker.run(), runner.run());
//! # Ok(())
//! # }
//! ```

pub mod monitor_runner;
pub mod worker;

pub use monitor_runner::{MonitorRunner, MonitorRunnerConfig};
pub use worker::{Worker, WorkerConfig};
