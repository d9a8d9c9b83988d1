//! Task builder
//!
//! Provides fluent API for building tasks.

use super::{Task, TaskStatus};
use crate::{Error, Result};
use serde::Serialize;
use uuid::Uuid;

/// Task builder
///
/// # Examples
///
/// ```rust
/// use ringq::Task;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct EmailPayload {
///     to: String,
/// }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let task = Task::builder("mail")
///     .task_type("email:send")
///     .json_payload(&EmailPayload { to: "user@example.com".to_string() })?
///     .id("welcome:user@example.com")
///     .unique(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TaskBuilder {
    queue: String,
    id: Option<String>,
    task_type: Option<String>,
    payload: String,
    unique: bool,
    status: Option<TaskStatus>,
}

impl TaskBuilder {
    /// Create a new task builder for the given queue
    #[must_use]
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            id: None,
            task_type: None,
            payload: String::new(),
            unique: false,
            status: None,
        }
    }

    /// Set the task id. Empty ids fall back to a random UUID.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the task type used for handler dispatch
    #[must_use]
    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Set raw string payload
    #[must_use]
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set payload serialized as JSON
    pub fn json_payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = serde_json::to_string(payload)?;
        Ok(self)
    }

    /// Mark the task as unique within its queue
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Override the status record (tests and replays)
    #[must_use]
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Build the task
    pub fn build(self) -> Result<Task> {
        let queue = self.queue.trim().to_string();
        if queue.is_empty() {
            return Err(Error::Validation("queue cannot be empty".into()));
        }

        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        Ok(Task {
            queue,
            id,
            task_type: self.task_type,
            payload: self.payload,
            unique: self.unique,
            status: self.status.unwrap_or_default(),
        })
    }
}
