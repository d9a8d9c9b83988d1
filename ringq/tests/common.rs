//! Common test utilities
//!
//! Shared helpers, handlers and pipelines for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ringq::monitor::Pipeline;
use ringq::queue::TaskQueue;
use ringq::storage::{MemoryStore, Store};
use ringq::Task;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Redis URL for the ignored server-backed tests
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Queue name unique to one test run
pub fn unique_queue(test_name: &str) -> String {
    format!("test-{}-{}", test_name, uuid::Uuid::new_v4())
}

/// Route library logs to the test output; `RUST_LOG` filters them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh in-memory store
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Build a task for `queue`
pub fn task(queue: &str, task_type: &str, payload: &str) -> Task {
    Task::builder(queue)
        .task_type(task_type)
        .payload(payload)
        .build()
        .expect("Failed to build task")
}

/// Wait for a condition to be true
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> Result<(), String>
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let check_interval = Duration::from_millis(10);

    while start.elapsed() < timeout {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(check_interval).await;
    }

    Err(format!("Condition not met after {:?}", timeout))
}

/// Pipeline that remembers every dead-lettered task
#[derive(Clone, Default)]
pub struct RecordingPipeline {
    seen: Arc<Mutex<Vec<(String, Task)>>>,
}

impl RecordingPipeline {
    /// Dead letters so far, as (queue name, task)
    pub fn seen(&self) -> Vec<(String, Task)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pipeline for RecordingPipeline {
    async fn process(&self, queue: &TaskQueue, task: &Task) {
        self.seen.lock().unwrap().push((queue.name().to_string(), task.clone()));
    }
}

/// Store whose selected operations fail until recovered
///
/// Operations are named after the [`Store`] method, e.g. `"rpush"`.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `op` fail from now on
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Let `op` through again
    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    fn check(&self, op: &'static str) -> ringq::Result<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(ringq::Error::Store(format!("{} unavailable", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn set_nx(&self, key: &str, value: &str) -> ringq::Result<bool> {
        self.check("set_nx")?;
        self.inner.set_nx(key, value).await
    }

    async fn get(&self, key: &str) -> ringq::Result<Option<String>> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn get_set(&self, key: &str, value: &str) -> ringq::Result<Option<String>> {
        self.check("get_set")?;
        self.inner.get_set(key, value).await
    }

    async fn del(&self, key: &str) -> ringq::Result<u64> {
        self.check("del")?;
        self.inner.del(key).await
    }

    async fn exists(&self, key: &str) -> ringq::Result<bool> {
        self.check("exists")?;
        self.inner.exists(key).await
    }

    async fn sadd(&self, key: &str, member: &str) -> ringq::Result<u64> {
        self.check("sadd")?;
        self.inner.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> ringq::Result<u64> {
        self.check("srem")?;
        self.inner.srem(key, member).await
    }

    async fn lpush(&self, key: &str, value: &str) -> ringq::Result<u64> {
        self.check("lpush")?;
        self.inner.lpush(key, value).await
    }

    async fn rpush(&self, key: &str, value: &str) -> ringq::Result<u64> {
        self.check("rpush")?;
        self.inner.rpush(key, value).await
    }

    async fn brpop(&self, key: &str, timeout: Option<Duration>) -> ringq::Result<Option<String>> {
        self.check("brpop")?;
        self.inner.brpop(key, timeout).await
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> ringq::Result<Option<String>> {
        self.check("rpoplpush")?;
        self.inner.rpoplpush(source, destination).await
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> ringq::Result<u64> {
        self.check("lrem")?;
        self.inner.lrem(key, count, value).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> ringq::Result<Vec<String>> {
        self.check("lrange")?;
        self.inner.lrange(key, start, stop).await
    }

    async fn llen(&self, key: &str) -> ringq::Result<u64> {
        self.check("llen")?;
        self.inner.llen(key).await
    }

    async fn lpush_if_absent(&self, key: &str, value: &str) -> ringq::Result<bool> {
        self.check("lpush_if_absent")?;
        self.inner.lpush_if_absent(key, value).await
    }
}

/// Mock handlers for testing
pub mod mock_handlers {
    use async_trait::async_trait;
    use ringq::processor::Handler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Handler that records task ids in processing order
    #[derive(Clone, Default)]
    pub struct OrderedHandler {
        pub processed: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Handler for OrderedHandler {
        async fn handle(&self, task: &ringq::Task) -> ringq::Result<()> {
            self.processed.lock().unwrap().push(task.id.clone());
            Ok(())
        }
    }

    /// Handler that always fails and counts invocations
    #[derive(Clone, Default)]
    pub struct FailingHandler {
        pub count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle(&self, _task: &ringq::Task) -> ringq::Result<()> {
            self.count.fetch_add(1, Ordering::Relaxed);
            Err(ringq::Error::Handler("always fails".to_string()))
        }
    }
}
