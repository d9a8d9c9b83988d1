//! Task queues
//!
//! A [`QueueManager`] owns the named queues it was configured with and, when
//! any of them is SAFE, the backup ring they share. Each [`TaskQueue`] is a
//! Redis list keyed by its name: producers push at the head, consumers pop
//! from the tail, and monitor redeliveries go to the tail so they come out
//! first.
//!
//! In SAFE mode every pop leaves a shadow copy in the backup ring, stamped
//! with the dequeue time, until `finish_task` removes it or the monitor
//! resolves it.

pub mod backup;

pub use backup::BackupQueue;

use crate::config::{QueueManagerConfig, QueueMode, QueueSpec};
use crate::observability::RingqMetrics;
use crate::storage::{Keys, Store};
use crate::task::{now_millis, Task};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// A named task queue
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn Store>,
    name: String,
    mode: QueueMode,
    backup: Option<BackupQueue>,
    alive_timeout_millis: i64,
    metrics: Option<RingqMetrics>,
}

impl TaskQueue {
    /// DEFAULT mode queue
    pub fn new(store: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            mode: QueueMode::Default,
            backup: None,
            alive_timeout_millis: i64::MAX,
            metrics: None,
        }
    }

    /// SAFE mode queue shadowing into `backup`
    pub fn safe(
        store: Arc<dyn Store>,
        name: impl Into<String>,
        backup: BackupQueue,
        alive_timeout_millis: i64,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            mode: QueueMode::Safe,
            backup: Some(backup),
            alive_timeout_millis,
            metrics: None,
        }
    }

    /// SAFE handle the monitor uses to redeliver into the task's own queue
    pub fn for_monitor(store: Arc<dyn Store>, name: impl Into<String>, backup: BackupQueue) -> Self {
        Self::safe(store, name, backup, i64::MAX)
    }

    /// Count queue traffic in the given collector
    #[must_use]
    pub fn with_metrics(mut self, metrics: RingqMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivery mode
    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Shared backup ring, SAFE queues only
    pub fn backup_queue(&self) -> Option<&BackupQueue> {
        self.backup.as_ref()
    }

    /// Push a task at the head of the list
    ///
    /// Returns `None` when a unique task is already queued or in flight, or
    /// when the store fails (logged).
    pub async fn push_task(&self, task: Task) -> Option<Task> {
        match self.try_push_task(task).await {
            Ok(pushed) => pushed,
            Err(e) => {
                tracing::error!("Failed to push task to queue {}: {}", self.name, e);
                None
            }
        }
    }

    /// Push a task at the head of the list
    pub async fn try_push_task(&self, task: Task) -> Result<Option<Task>> {
        let encoded = task.encode()?;

        if self.mode == QueueMode::Safe && task.unique {
            let added = self.store.sadd(&Keys::unique(&self.name), &task.id).await?;
            if added == 0 {
                tracing::debug!("Duplicate unique task {} rejected by queue {}", task.id, self.name);
                if let Some(metrics) = &self.metrics {
                    metrics.record_duplicate(&self.name);
                }
                return Ok(None);
            }
        }

        if let Err(e) = self.store.lpush(&Keys::queue(&self.name), &encoded).await {
            if self.mode == QueueMode::Safe && task.unique {
                if let Err(undo) = self.store.srem(&Keys::unique(&self.name), &task.id).await {
                    tracing::warn!("Could not release unique id {} of queue {}: {}",
                        task.id, self.name, undo);
                }
            }
            return Err(e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_pushed(&self.name);
        }
        tracing::debug!("Pushed {} to queue {}", task.description(), self.name);
        Ok(Some(task))
    }

    /// Push a task at the tail, ahead of everything already waiting
    pub async fn push_task_to_header(&self, task: &Task) {
        if let Err(e) = self.try_push_task_to_header(task).await {
            tracing::error!("Failed to push task {} to header of queue {}: {}",
                task.id, self.name, e);
        }
    }

    /// Push a task at the tail, ahead of everything already waiting
    pub async fn try_push_task_to_header(&self, task: &Task) -> Result<()> {
        self.store.rpush(&Keys::queue(&self.name), &task.encode()?).await?;
        tracing::debug!("Pushed {} to header of queue {}", task.description(), self.name);
        Ok(())
    }

    /// Block until a task is available and take it
    ///
    /// Store failures are logged and reported as `None`.
    pub async fn pop_task(&self) -> Option<Task> {
        match self.try_pop_task().await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("Failed to pop task from queue {}: {}", self.name, e);
                None
            }
        }
    }

    /// Block until a task is available and take it
    pub async fn try_pop_task(&self) -> Result<Option<Task>> {
        self.try_pop_task_timeout(None).await
    }

    /// Like [`TaskQueue::try_pop_task`], giving up after `timeout`
    ///
    /// `None` blocks forever.
    pub async fn try_pop_task_timeout(&self, timeout: Option<Duration>) -> Result<Option<Task>> {
        let Some(raw) = self.store.brpop(&Keys::queue(&self.name), timeout).await? else {
            return Ok(None);
        };

        let mut task = Task::decode(&raw).map_err(|e| {
            tracing::error!("Dropping undecodable entry from queue {}: {}", self.name, raw);
            e
        })?;

        if let Some(metrics) = &self.metrics {
            metrics.record_popped(&self.name);
        }

        if let Some(backup) = &self.backup {
            let now = now_millis();
            if task.lifetime_elapsed(now) > self.alive_timeout_millis {
                tracing::warn!("{} exceeded its alive timeout, running without backup",
                    task.description());
            } else {
                task.status.exc_timestamp = now;
                // The task has already left the list; hand it out even unshadowed
                match backup.shadow(&task).await {
                    Ok(()) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_shadowed(&self.name);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to back up {} in {}, running without backup: {}",
                            task.description(), backup.name(), e);
                    }
                }
            }
        }

        tracing::debug!("Popped {} from queue {}", task.description(), self.name);
        Ok(Some(task))
    }

    /// Remove the task's shadow copy and uniqueness marker (SAFE only)
    pub async fn finish_task(&self, task: &Task) {
        if let Err(e) = self.try_finish_task(task).await {
            tracing::error!("Failed to finish task {} on queue {}: {}", task.id, self.name, e);
        }
    }

    /// Remove the task's shadow copy and uniqueness marker (SAFE only)
    pub async fn try_finish_task(&self, task: &Task) -> Result<()> {
        let Some(backup) = &self.backup else {
            return Ok(());
        };

        let removed = backup.try_finish_task(task).await?;
        self.store.srem(&Keys::unique(&self.name), &task.id).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_finished(&self.name);
        }
        tracing::debug!("Finished {} ({} backup entries removed)", task.description(), removed);
        Ok(())
    }

    /// Number of waiting tasks
    pub async fn len(&self) -> Result<u64> {
        self.store.llen(&Keys::queue(&self.name)).await
    }

    /// Check whether no task is waiting
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("backup", &self.backup)
            .finish()
    }
}

/// Queue manager
///
/// # Examples
///
/// ```rust,no_run
/// use ringq::config::QueueManagerConfig;
/// use ringq::queue::QueueManager;
/// use ringq::storage::RedisStore;
/// use ringq::Task;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> ringq::Result<()> {
/// let store = Arc::new(RedisStore::from_url("redis://localhost:6379").await?);
/// let config = QueueManagerConfig::new(&["orders:safe", "mail"])
///     .with_alive_timeout(Duration::from_secs(300));
/// let manager = QueueManager::new(store, config).await?;
///
/// let orders = manager.task_queue("orders").expect("configured");
/// orders.push_task(Task::builder("orders").payload("42").build()?).await;
/// # Ok(())
/// # }
/// ```
pub struct QueueManager {
    queues: Vec<TaskQueue>,
    backup: Option<BackupQueue>,
    backup_queue_name: String,
    alive_timeout: Duration,
}

impl QueueManager {
    /// Parse the queue specs, build the queues and seed the backup ring
    ///
    /// A queue listed twice must use the same mode both times.
    pub async fn new(store: Arc<dyn Store>, config: QueueManagerConfig) -> Result<Self> {
        let specs = config.specs()?;

        let mut unique_specs: Vec<QueueSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            match unique_specs.iter().find(|s| s.name == spec.name) {
                Some(existing) if existing.mode != spec.mode => {
                    return Err(Error::Config(format!(
                        "queue {} configured as both {} and {}",
                        spec.name, existing.mode, spec.mode
                    )));
                }
                Some(_) => {}
                None => unique_specs.push(spec),
            }
        }

        let names: Vec<&str> = unique_specs.iter().map(|s| s.name.as_str()).collect();
        let backup_queue_name = Keys::backup_queue(&names);
        let alive_timeout_millis = config.alive_timeout_millis();

        let backup = if unique_specs.iter().any(|s| s.mode == QueueMode::Safe) {
            let backup = BackupQueue::new(store.clone(), backup_queue_name.clone());
            backup.try_init_queue().await?;
            Some(backup)
        } else {
            None
        };

        let queues = unique_specs
            .into_iter()
            .map(|spec| match (spec.mode, &backup) {
                (QueueMode::Safe, Some(backup)) => {
                    TaskQueue::safe(store.clone(), spec.name, backup.clone(), alive_timeout_millis)
                }
                _ => TaskQueue::new(store.clone(), spec.name),
            })
            .collect::<Vec<_>>();

        tracing::info!("Queue manager ready: queues={:?}, backup_queue={}",
            queues.iter().map(|q| format!("{}:{}", q.name, q.mode)).collect::<Vec<_>>(),
            backup_queue_name);

        Ok(Self {
            queues,
            backup,
            backup_queue_name,
            alive_timeout: config.alive_timeout,
        })
    }

    /// Count traffic of every queue in the given collector
    #[must_use]
    pub fn with_metrics(mut self, metrics: RingqMetrics) -> Self {
        self.queues = self
            .queues
            .into_iter()
            .map(|q| q.with_metrics(metrics.clone()))
            .collect();
        self
    }

    /// Look up a queue by name
    pub fn task_queue(&self, name: &str) -> Option<&TaskQueue> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// All queues, in configuration order
    pub fn queues(&self) -> &[TaskQueue] {
        &self.queues
    }

    /// Backup ring, present when any queue is SAFE
    pub fn backup_queue(&self) -> Option<&BackupQueue> {
        self.backup.as_ref()
    }

    /// Backup ring key derived from the managed queue names
    pub fn backup_queue_name(&self) -> &str {
        &self.backup_queue_name
    }

    /// Configured task lifetime; zero means unlimited
    pub fn alive_timeout(&self) -> Duration {
        self.alive_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::task::TaskStatus;

    async fn manager(store: &Arc<MemoryStore>, queues: &[&str]) -> QueueManager {
        QueueManager::new(store.clone(), QueueManagerConfig::new(queues))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_manager_builds_queues() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, &["a:safe", "b", "a:safe"]).await;

        assert_eq!(m.queues().len(), 2);
        assert_eq!(m.task_queue("a").unwrap().mode(), QueueMode::Safe);
        assert_eq!(m.task_queue("b").unwrap().mode(), QueueMode::Default);
        assert!(m.task_queue("c").is_none());
        assert_eq!(m.backup_queue_name(), Keys::backup_queue(&["a", "b"]));
        assert_eq!(store.llen(m.backup_queue_name()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_manager_without_safe_queue_has_no_ring() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, &["a", "b:default"]).await;

        assert!(m.backup_queue().is_none());
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_manager_rejects_bad_config() {
        let store = Arc::new(MemoryStore::new());
        for queues in [&["a:fast"][..], &["a:safe", "a:default"][..], &[":safe"][..]] {
            let result = QueueManager::new(store.clone(), QueueManagerConfig::new(queues)).await;
            assert!(matches!(result, Err(Error::Config(_))), "{:?}", queues);
        }
    }

    #[tokio::test]
    async fn test_managers_share_one_marker() {
        let store = Arc::new(MemoryStore::new());
        let first = manager(&store, &["a:safe", "b"]).await;
        let second = manager(&store, &["b", "a:safe"]).await;

        assert_eq!(first.backup_queue_name(), second.backup_queue_name());
        assert_eq!(store.llen(first.backup_queue_name()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fifo_and_header_priority() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, &["q"]).await;
        let q = m.task_queue("q").unwrap();

        for id in ["1", "2"] {
            q.push_task(Task::builder("q").id(id).build().unwrap()).await.unwrap();
        }
        q.push_task_to_header(&Task::builder("q").id("retry").build().unwrap()).await;

        assert_eq!(q.pop_task().await.unwrap().id, "retry");
        assert_eq!(q.pop_task().await.unwrap().id, "1");
        assert_eq!(q.pop_task().await.unwrap().id, "2");
    }

    #[tokio::test]
    async fn test_unique_dedup_until_finished() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, &["q:safe"]).await;
        let q = m.task_queue("q").unwrap();
        let task = || Task::builder("q").id("same").unique(true).build().unwrap();

        assert!(q.push_task(task()).await.is_some());
        assert!(q.push_task(task()).await.is_none());
        assert_eq!(q.len().await.unwrap(), 1);

        let popped = q.pop_task().await.unwrap();
        assert!(q.push_task(task()).await.is_none());

        q.finish_task(&popped).await;
        assert!(q.push_task(task()).await.is_some());
    }

    #[tokio::test]
    async fn test_default_mode_ignores_unique_and_backup() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, &["q"]).await;
        let q = m.task_queue("q").unwrap();
        let task = || Task::builder("q").id("same").unique(true).build().unwrap();

        assert!(q.push_task(task()).await.is_some());
        assert!(q.push_task(task()).await.is_some());

        let popped = q.pop_task().await.unwrap();
        assert_eq!(popped.status.exc_timestamp, 0);
        q.finish_task(&popped).await;
        assert_eq!(q.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_safe_pop_shadows_until_finish() {
        let store = Arc::new(MemoryStore::new());
        let m = manager(&store, &["q:safe"]).await;
        let q = m.task_queue("q").unwrap();
        let ring = m.backup_queue().unwrap();

        q.push_task(Task::builder("q").payload("p").build().unwrap()).await.unwrap();
        let popped = q.pop_task().await.unwrap();
        assert!(popped.status.exc_timestamp > 0);
        assert_eq!(ring.len().await.unwrap(), 2);
        assert!(ring.snapshot().await.unwrap().contains(&popped.encode().unwrap()));

        q.finish_task(&popped).await;
        assert_eq!(ring.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_task_is_not_shadowed() {
        let store = Arc::new(MemoryStore::new());
        let config = QueueManagerConfig::new(&["q:safe"]).with_alive_timeout(Duration::from_millis(1_000));
        let m = QueueManager::new(store.clone(), config).await.unwrap();
        let q = m.task_queue("q").unwrap();

        let old = Task::builder("q")
            .status(TaskStatus::generated_at(now_millis() - 5_000))
            .build()
            .unwrap();
        q.push_task(old).await.unwrap();

        let popped = q.pop_task().await.unwrap();
        assert_eq!(popped.status.exc_timestamp, 0);
        assert_eq!(m.backup_queue().unwrap().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_timeout_on_empty_queue() {
        let store = Arc::new(MemoryStore::new());
        let q = TaskQueue::new(store, "q");
        let popped = q.try_pop_task_timeout(Some(Duration::from_millis(20))).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let q = TaskQueue::new(store, "q");
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.pop_task().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push_task(Task::builder("q").id("late").build().unwrap()).await.unwrap();

        assert_eq!(consumer.await.unwrap().unwrap().id, "late");
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.lpush("q", "{broken").await.unwrap();
        let q = TaskQueue::new(store, "q");

        assert!(matches!(q.try_pop_task().await, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_queue_metrics() {
        let store = Arc::new(MemoryStore::new());
        let metrics = RingqMetrics::new().unwrap();
        let m = manager(&store, &["q:safe"]).await.with_metrics(metrics.clone());
        let q = m.task_queue("q").unwrap();

        let task = || Task::builder("q").id("x").unique(true).build().unwrap();
        q.push_task(task()).await.unwrap();
        assert!(q.push_task(task()).await.is_none());
        let popped = q.pop_task().await.unwrap();
        q.finish_task(&popped).await;

        let output = metrics.gather();
        assert!(output.contains("ringq_tasks_pushed_total{queue=\"q\"} 1"));
        assert!(output.contains("ringq_tasks_duplicate_total{queue=\"q\"} 1"));
        assert!(output.contains("ringq_tasks_shadowed_total{queue=\"q\"} 1"));
        assert!(output.contains("ringq_tasks_finished_total{queue=\"q\"} 1"));
    }
}
