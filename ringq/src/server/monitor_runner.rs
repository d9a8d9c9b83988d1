//! Monitor runner
//!
//! Runs [`BackupQueueMonitor::monitor`] on a fixed interval. Each pass first
//! takes the distributed lock `<ring>_monitor_lock`, so only one process
//! scans a given ring at a time; a pass whose lock is busy is skipped.

use crate::config::LockConfig;
use crate::lock::DistributedLock;
use crate::monitor::{BackupQueueMonitor, MonitorReport};
use crate::storage::Keys;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use uuid::Uuid;

/// Configuration for the monitor runner
#[derive(Debug, Clone)]
pub struct MonitorRunnerConfig {
    /// Interval between passes
    pub interval: Duration,
    /// Lock settings; a zero acquire timeout makes a busy lock skip the pass at once
    pub lock: LockConfig,
}

impl Default for MonitorRunnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            lock: LockConfig::default().with_acquire_timeout(Duration::ZERO),
        }
    }
}

impl MonitorRunnerConfig {
    /// Create a runner configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pass interval
    #[must_use]
    pub fn interval(mut self, duration: Duration) -> Self {
        self.interval = duration;
        self
    }

    /// Set the lock configuration
    #[must_use]
    pub fn lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }
}

/// Periodic, lock-guarded monitor
pub struct MonitorRunner {
    monitor: BackupQueueMonitor,
    config: MonitorRunnerConfig,
    owner: Uuid,
    shutdown: Arc<AtomicBool>,
}

impl MonitorRunner {
    /// Create a new runner
    pub fn new(monitor: BackupQueueMonitor, config: MonitorRunnerConfig) -> Result<Self> {
        config.lock.validate()?;
        Ok(Self {
            monitor,
            config,
            owner: Uuid::new_v4(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get a handle to the shutdown flag
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Stop the runner after the current pass
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Lock key guarding the ring
    pub fn lock_key(&self) -> String {
        Keys::monitor_lock(self.monitor.backup_queue().name())
    }

    /// Start the monitor loop
    pub async fn run(&self) {
        let mut timer = interval(self.config.interval);

        tracing::info!("Monitor runner started (backup_queue: {}, interval: {:?})",
            self.monitor.backup_queue().name(), self.config.interval);

        while !self.shutdown.load(Ordering::Relaxed) {
            timer.tick().await;

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.run_once().await {
                Ok(Some(report)) => tracing::debug!("Monitor pass done: {}", report),
                Ok(None) => {}
                Err(e) => tracing::error!("Monitor pass failed: {}", e),
            }
        }

        tracing::info!("Monitor runner stopped");
    }

    /// Run one pass under the lock
    ///
    /// Returns `None` when another process holds the lock.
    pub async fn run_once(&self) -> Result<Option<MonitorReport>> {
        let mut lock = DistributedLock::with_owner(
            self.monitor.store().clone(),
            self.lock_key(),
            self.config.lock,
            self.owner,
        )?;

        if !lock.acquire().await? {
            tracing::debug!("Monitor lock {} is busy, skipping pass", lock.key());
            return Ok(None);
        }

        let report = self.monitor.monitor().await;

        if let Err(e) = lock.release().await {
            tracing::warn!("Failed to release monitor lock {}: {}", lock.key(), e);
        }
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::queue::BackupQueue;
    use crate::storage::{MemoryStore, Store};

    const RING: &str = "back_up_queue_runner";

    async fn runner(store: &Arc<MemoryStore>, config: MonitorRunnerConfig) -> MonitorRunner {
        BackupQueue::new(store.clone(), RING).try_init_queue().await.unwrap();
        let monitor = BackupQueueMonitor::new(store.clone(), MonitorConfig::new(RING)).unwrap();
        MonitorRunner::new(monitor, config).unwrap()
    }

    #[test]
    fn test_runner_config_default() {
        let config = MonitorRunnerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.lock.acquire_timeout, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_run_once_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&store, MonitorRunnerConfig::new()).await;

        assert_eq!(runner.run_once().await.unwrap(), Some(MonitorReport::default()));
        assert!(!store.exists(&runner.lock_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_busy_lock_skips_pass() {
        let store = Arc::new(MemoryStore::new());
        let runner = runner(&store, MonitorRunnerConfig::new()).await;

        let mut other = DistributedLock::new(store.clone(), runner.lock_key(), LockConfig::default()).unwrap();
        assert!(other.acquire().await.unwrap());

        assert_eq!(runner.run_once().await.unwrap(), None);

        other.release().await.unwrap();
        assert!(runner.run_once().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(
            runner(&store, MonitorRunnerConfig::new().interval(Duration::from_millis(10))).await,
        );

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        runner.shutdown();
        handle.await.unwrap();

        assert!(!store.exists(&runner.lock_key()).await.unwrap());
    }
}
