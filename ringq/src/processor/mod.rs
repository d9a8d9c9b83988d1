//! Processor module
//!
//! Handler trait, the [`Mux`] registry that picks a handler by task type,
//! and [`execute`], which runs a task and finishes it on its queue.

use crate::queue::TaskQueue;
use crate::task::Task;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler trait - Task processor
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle task
    async fn handle(&self, task: &Task) -> Result<()>;
}

/// Multiplexer - maps task types to handlers
///
/// # Examples
///
/// ```rust
/// use ringq::processor::{Handler, Mux};
/// use ringq::Task;
/// use async_trait::async_trait;
///
/// struct EmailHandler;
///
/// #[async_trait]
/// impl Handler for EmailHandler {
///     async fn handle(&self, task: &Task) -> ringq::Result<()> {
///         println!("sending {}", task.payload);
///         Ok(())
///     }
/// }
///
/// let mut mux = Mux::new();
/// mux.handle("email:send", EmailHandler);
/// assert!(mux.has_handler("email:send"));
/// ```
#[derive(Clone, Default)]
pub struct Mux {
    handlers: HashMap<String, Arc<dyn Handler>>,
    fallback: Option<Arc<dyn Handler>>,
}

impl Mux {
    /// Create a new multiplexer
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handler for a task type, replacing any previous one
    pub fn handle<H: Handler + 'static>(&mut self, task_type: &str, handler: H) {
        self.handlers.insert(task_type.to_string(), Arc::new(handler));
    }

    /// Register handler for tasks whose type has no handler of its own
    pub fn fallback<H: Handler + 'static>(&mut self, handler: H) {
        self.fallback = Some(Arc::new(handler));
    }

    /// Check whether a handler is registered for the type
    pub fn has_handler(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types
    pub fn task_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Dispatch the task to its handler
    pub async fn process(&self, task: &Task) -> Result<()> {
        let handler = task
            .task_type
            .as_deref()
            .and_then(|t| self.handlers.get(t))
            .or(self.fallback.as_ref())
            .ok_or_else(|| {
                Error::HandlerNotFound(task.task_type.clone().unwrap_or_else(|| "<none>".into()))
            })?;

        handler.handle(task).await
    }
}

/// Run a task and finish it on its queue
///
/// A failing handler is logged; the task is finished either way, so a SAFE
/// task's shadow copy never outlives a completed attempt. The handler's
/// result is returned.
pub async fn execute(queue: &TaskQueue, task: &Task, mux: &Mux) -> Result<()> {
    tracing::debug!("Processing task: {}", task.description());

    let result = mux.process(task).await;
    match &result {
        Ok(()) => tracing::debug!("Task {} processed successfully", task.id),
        Err(e) => tracing::error!("Task {} failed on queue {}: {}", task.id, queue.name(), e),
    }

    queue.finish_task(task).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueManagerConfig;
    use crate::queue::QueueManager;
    use crate::storage::{MemoryStore, Store};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for Counting {
        async fn handle(&self, _task: &Task) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Handler for Failing {
        async fn handle(&self, _task: &Task) -> Result<()> {
            Err(Error::Handler("boom".into()))
        }
    }

    #[tokio::test]
    async fn test_mux_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = Mux::new();
        mux.handle("count", Counting(calls.clone()));

        let task = Task::builder("q").task_type("count").build().unwrap();
        mux.process(&task).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(mux.task_types(), vec!["count"]);
    }

    #[tokio::test]
    async fn test_mux_missing_handler() {
        let mux = Mux::new();
        let typed = Task::builder("q").task_type("nope").build().unwrap();
        let untyped = Task::builder("q").build().unwrap();

        assert!(matches!(mux.process(&typed).await, Err(Error::HandlerNotFound(t)) if t == "nope"));
        assert!(matches!(mux.process(&untyped).await, Err(Error::HandlerNotFound(_))));
    }

    #[tokio::test]
    async fn test_mux_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = Mux::new();
        mux.fallback(Counting(calls.clone()));

        mux.process(&Task::builder("q").build().unwrap()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_finishes_failed_safe_task() {
        let store = Arc::new(MemoryStore::new());
        let manager = QueueManager::new(store.clone(), QueueManagerConfig::new(&["q:safe"]))
            .await
            .unwrap();
        let queue = manager.task_queue("q").unwrap();
        let ring = manager.backup_queue().unwrap();

        let mut mux = Mux::new();
        mux.handle("fail", Failing);

        let task = Task::builder("q").task_type("fail").unique(true).build().unwrap();
        queue.push_task(task).await.unwrap();
        let popped = queue.pop_task().await.unwrap();
        assert_eq!(ring.len().await.unwrap(), 2);

        assert!(matches!(execute(queue, &popped, &mux).await, Err(Error::Handler(_))));
        assert_eq!(ring.len().await.unwrap(), 1);
        assert!(!store.exists("q_unique").await.unwrap());
    }
}
