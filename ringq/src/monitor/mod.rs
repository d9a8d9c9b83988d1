//! Backup ring monitor
//!
//! One call to [`BackupQueueMonitor::monitor`] walks the backup ring exactly
//! once, rotating entries until it meets the marker. For every shadow copy:
//!
//! 1. past its total lifetime: hand it to the dead-letter [`Pipeline`] and
//!    drop it from the ring, then keep evaluating the same entry;
//! 2. past its per-attempt budget: unless an [`AliveDetector`] vouches for
//!    it, either redeliver it at the front of its queue with the retry
//!    counter bumped, or dead-letter it once retries are used up, and drop
//!    the scanned copy from the ring.
//!
//! Entries that are not due stay where the rotation put them.
//!
//! Two monitors scanning the same ring can both act on one entry; run it
//! through [`crate::server::MonitorRunner`] to serialize passes with the
//! distributed lock.

use crate::config::MonitorConfig;
use crate::observability::RingqMetrics;
use crate::queue::{BackupQueue, TaskQueue};
use crate::storage::{Keys, Store};
use crate::task::{now_millis, Task, TaskState};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Dead-letter handler for tasks that will not be retried
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Take final ownership of `task`, which belonged to `queue`
    async fn process(&self, queue: &TaskQueue, task: &Task);
}

/// Pipeline that only logs the task
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPipeline;

#[async_trait]
impl Pipeline for LoggingPipeline {
    async fn process(&self, queue: &TaskQueue, task: &Task) {
        tracing::warn!("Dead letter from queue {}: {} payload={}",
            queue.name(), task.description(), task.payload);
    }
}

/// Check whether a timed-out task is in fact still running
#[async_trait]
pub trait AliveDetector: Send + Sync {
    /// True means "still executing, leave it alone"
    async fn check(&self, monitor: &BackupQueueMonitor, task: &Task) -> bool;
}

/// Treats a task as alive while the key `<task id>_alive` holds a non-blank value
///
/// Handlers of long tasks refresh that key (with an expiry) as a heartbeat.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisAliveDetector;

#[async_trait]
impl AliveDetector for RedisAliveDetector {
    async fn check(&self, monitor: &BackupQueueMonitor, task: &Task) -> bool {
        match monitor.store().get(&Keys::alive(&task.id)).await {
            Ok(Some(value)) => !value.trim().is_empty(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Alive check for task {} failed: {}", task.id, e);
                false
            }
        }
    }
}

/// Outcome counters of one monitor pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// Shadow entries examined, marker excluded
    pub scanned: u64,
    /// Entries redelivered to their queue
    pub retried: u64,
    /// Entries dead-lettered after exhausting retries
    pub dead_lettered: u64,
    /// Entries dead-lettered for exceeding their lifetime
    pub expired: u64,
    /// Timed-out entries left in place because they are still running
    pub alive: u64,
}

impl std::fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned={} retried={} dead_lettered={} expired={} alive={}",
            self.scanned, self.retried, self.dead_lettered, self.expired, self.alive
        )
    }
}

/// Backup ring monitor
pub struct BackupQueueMonitor {
    store: Arc<dyn Store>,
    config: MonitorConfig,
    backup: BackupQueue,
    pipeline: Option<Arc<dyn Pipeline>>,
    alive_detector: Option<Arc<dyn AliveDetector>>,
    metrics: Option<RingqMetrics>,
}

impl BackupQueueMonitor {
    /// Create a monitor for the ring named in `config`
    pub fn new(store: Arc<dyn Store>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let backup = BackupQueue::new(store.clone(), config.backup_queue_name.clone());
        Ok(Self {
            store,
            config,
            backup,
            pipeline: None,
            alive_detector: None,
            metrics: None,
        })
    }

    /// Register the dead-letter pipeline
    #[must_use]
    pub fn pipeline(mut self, pipeline: impl Pipeline + 'static) -> Self {
        self.pipeline = Some(Arc::new(pipeline));
        self
    }

    /// Register a liveness check
    #[must_use]
    pub fn alive_detector(mut self, detector: impl AliveDetector + 'static) -> Self {
        self.alive_detector = Some(Arc::new(detector));
        self
    }

    /// Count retries and dead letters in the given collector
    #[must_use]
    pub fn with_metrics(mut self, metrics: RingqMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Store the monitor works on
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Monitor configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Ring being scanned
    pub fn backup_queue(&self) -> &BackupQueue {
        &self.backup
    }

    /// Run one full pass over the ring
    ///
    /// A store failure ends the pass early; it is logged and the counters
    /// gathered so far are returned.
    pub async fn monitor(&self) -> MonitorReport {
        let started = Instant::now();
        let mut report = MonitorReport::default();
        tracing::info!("Backup queue {} monitoring begins", self.backup.name());

        if let Err(e) = self.scan(&mut report).await {
            tracing::error!("Backup queue {} monitoring aborted: {}", self.backup.name(), e);
        }

        if let Some(metrics) = &self.metrics {
            match self.backup.len().await {
                Ok(len) => metrics.update_backup_queue_length(self.backup.name(), len),
                Err(e) => tracing::debug!("Could not read backup queue length: {}", e),
            }
        }

        tracing::info!("Backup queue {} monitoring finished in {:?}: {}",
            self.backup.name(), started.elapsed(), report);
        report
    }

    async fn scan(&self, report: &mut MonitorReport) -> Result<()> {
        let ring = self.backup.name();
        let alive_timeout = self.config.alive_timeout_millis();
        let protected_timeout = self.config.protected_timeout_millis();

        // One rotation reaches the marker. The budget is topped up once for
        // shadows appended while the pass runs.
        let mut budget = self.backup.len().await?;
        let mut topped_up = false;

        loop {
            if budget == 0 {
                if topped_up {
                    tracing::warn!("Backup queue {} has no marker, stopping the pass", ring);
                    return Ok(());
                }
                topped_up = true;
                budget = self.backup.len().await?;
                if budget == 0 {
                    return Ok(());
                }
            }
            budget -= 1;

            let Some(raw) = self.backup.try_pop_raw().await? else {
                return Ok(());
            };

            let mut task = match Task::decode(&raw) {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!("Skipping undecodable backup entry {}: {}", raw, e);
                    continue;
                }
            };

            if task.is_marker_of(ring) {
                return Ok(());
            }
            report.scanned += 1;

            let queue = TaskQueue::for_monitor(self.store.clone(), task.queue.clone(), self.backup.clone());
            let now = now_millis();

            // No `continue` after this branch: the same entry still goes through
            // the per-attempt check below
            if task.lifetime_elapsed(now) > alive_timeout {
                tracing::info!("{} exceeded its alive timeout", task.description());
                self.dead_letter(&queue, &task, "expired").await;
                self.backup.remove_raw(&raw).await?;
                report.expired += 1;
            }

            if task.attempt_elapsed(now) <= protected_timeout {
                continue;
            }

            if let Some(detector) = &self.alive_detector {
                if detector.check(self, &task).await {
                    tracing::debug!("{} timed out but is still alive", task.description());
                    report.alive += 1;
                    continue;
                }
            }

            if task.status.retry < self.config.retry_times {
                task.status.state = TaskState::Retry;
                task.status.retry += 1;
                queue.try_push_task_to_header(&task).await?;
                tracing::info!("Retrying {}", task.description());
                if let Some(metrics) = &self.metrics {
                    metrics.record_retried(&task.queue);
                }
                report.retried += 1;
            } else {
                tracing::info!("{} used up its retries", task.description());
                self.dead_letter(&queue, &task, "exhausted").await;
                report.dead_lettered += 1;
            }

            // `raw` is the entry as it sat in the ring before the mutation above
            self.backup.remove_raw(&raw).await?;
        }
    }

    async fn dead_letter(&self, queue: &TaskQueue, task: &Task, reason: &str) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.process(queue, task).await;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_dead_lettered(&task.queue, reason);
        }
    }
}
