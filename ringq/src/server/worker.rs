//! Worker implementation
//!
//! Workers pop tasks from their queues and run them through the registered
//! handlers until told to stop.

use crate::processor::{execute, Mux};
use crate::queue::TaskQueue;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long one blocking pop waits before the shutdown flag is checked again
    pub poll_timeout: Duration,

    /// Pause after a store failure when the error suggests no delay of its own
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Create a worker configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll timeout
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the error backoff
    #[must_use]
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout.is_zero() {
            return Err(Error::Config("poll_timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Worker - task processing unit
///
/// Polls its queues round-robin; every popped task goes through
/// [`execute`], so SAFE tasks are finished whatever the handler returns.
pub struct Worker {
    /// Unique worker ID
    pub id: String,

    queues: Vec<TaskQueue>,
    mux: Arc<Mux>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
    queue_index: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl Worker {
    /// Create a worker over the given queues
    pub fn new(queues: Vec<TaskQueue>, mux: Arc<Mux>, config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        if queues.is_empty() {
            return Err(Error::Config("worker needs at least one queue".into()));
        }

        Ok(Self {
            id: format!("worker-{}", Uuid::new_v4()),
            queues,
            mux,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            queue_index: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Get a handle to the shutdown flag
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Ask the loop to stop after the current poll
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Tasks whose handler succeeded
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Tasks whose handler failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Run until the shutdown flag is set
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Worker {} started (queues: {:?})",
            self.id, self.queues.iter().map(TaskQueue::name).collect::<Vec<_>>());

        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.run_once().await {
                if e.is_retryable() {
                    tracing::error!("Worker {} dequeue failed: {}", self.id, e);
                    let delay = e.retry_after().unwrap_or(self.config.error_backoff);
                    tokio::time::sleep(delay).await;
                } else {
                    tracing::warn!("Worker {} skipped a task: {}", self.id, e);
                }
            }
        }

        tracing::info!("Worker {} stopped (processed: {}, failed: {})",
            self.id, self.processed(), self.failed());
        Ok(())
    }

    /// Poll the next queue once and execute what it yields
    ///
    /// Returns whether a task was executed. Handler failures are counted,
    /// not returned.
    pub async fn run_once(&self) -> Result<bool> {
        let queue = self.next_queue();

        let Some(task) = queue.try_pop_task_timeout(Some(self.config.poll_timeout)).await? else {
            return Ok(false);
        };

        match execute(queue, &task, &self.mux).await {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(true)
    }

    fn next_queue(&self) -> &TaskQueue {
        let index = self.queue_index.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        &self.queues[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Handler;
    use crate::storage::MemoryStore;
    use crate::Task;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, task: &Task) -> Result<()> {
            if task.payload == "fail" {
                return Err(Error::Handler("requested failure".into()));
            }
            Ok(())
        }
    }

    fn mux() -> Arc<Mux> {
        let mut mux = Mux::new();
        mux.handle("echo", Echo);
        Arc::new(mux)
    }

    fn fast() -> WorkerConfig {
        WorkerConfig::new().with_poll_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_worker_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert!(WorkerConfig::new().with_poll_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_worker_needs_a_queue() {
        assert!(Worker::new(Vec::new(), mux(), fast()).is_err());
    }

    #[tokio::test]
    async fn test_run_once_round_robin() {
        let store = Arc::new(MemoryStore::new());
        let a = TaskQueue::new(store.clone(), "a");
        let b = TaskQueue::new(store.clone(), "b");
        b.push_task(Task::builder("b").task_type("echo").build().unwrap()).await.unwrap();

        let worker = Worker::new(vec![a, b.clone()], mux(), fast()).unwrap();
        assert!(!worker.run_once().await.unwrap());
        assert!(worker.run_once().await.unwrap());
        assert_eq!(worker.processed(), 1);
        assert!(b.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let queue = TaskQueue::new(store.clone(), "q");
        for payload in ["ok", "fail", "ok"] {
            let task = Task::builder("q").task_type("echo").payload(payload).build().unwrap();
            queue.push_task(task).await.unwrap();
        }

        let worker = Arc::new(Worker::new(vec![queue.clone()], mux(), fast()).unwrap());
        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        for _ in 0..100 {
            if worker.processed() + worker.failed() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        worker.shutdown();
        handle.await.unwrap().unwrap();

        assert_eq!(worker.processed(), 2);
        assert_eq!(worker.failed(), 1);
    }
}
