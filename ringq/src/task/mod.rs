//! Task type definitions
//!
//! A [`Task`] travels through the main list, the backup ring and back. Its
//! serialized JSON form is also its identity inside the ring, so the field
//! order here is part of the wire format.

use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub mod builder;

pub use builder::TaskBuilder;

/// Task type of the backup ring sentinel
pub const MARKER: &str = "marker";

/// Current time as Unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Delivery state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// First delivery
    #[default]
    Normal,
    /// Redelivered by the monitor after a per-attempt timeout
    Retry,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Normal => write!(f, "normal"),
            TaskState::Retry => write!(f, "retry"),
        }
    }
}

/// Mutable status record of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Delivery state
    pub state: TaskState,
    /// Creation time (epoch millis), never changes across retries
    pub gen_timestamp: i64,
    /// Time of the most recent dequeue for execution (epoch millis), 0 before the first
    pub exc_timestamp: i64,
    /// Number of monitor-driven retries so far
    pub retry: u32,
}

impl TaskStatus {
    /// Fresh status stamped with the current time
    pub fn new() -> Self {
        Self::generated_at(now_millis())
    }

    /// Fresh status with an explicit creation time
    pub fn generated_at(gen_timestamp: i64) -> Self {
        Self {
            state: TaskState::Normal,
            gen_timestamp,
            exc_timestamp: 0,
            retry: 0,
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Task struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Name of the owning queue
    pub queue: String,
    /// Task ID (UUID unless the producer supplied one)
    pub id: String,
    /// Task type, used to pick a handler
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    /// Opaque payload
    pub payload: String,
    /// Reject pushes while a task with the same id is queued or in flight
    pub unique: bool,
    /// Status record
    pub status: TaskStatus,
}

impl Task {
    /// Create a new task builder
    #[must_use]
    pub fn builder(queue: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(queue)
    }

    /// Sentinel that bounds one scan of the backup ring
    pub fn marker(backup_queue_name: &str) -> Self {
        Self {
            queue: backup_queue_name.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            task_type: Some(MARKER.to_string()),
            payload: String::new(),
            unique: false,
            status: TaskStatus::new(),
        }
    }

    /// Check whether this is the sentinel of the given ring
    pub fn is_marker_of(&self, backup_queue_name: &str) -> bool {
        self.queue == backup_queue_name && self.task_type.as_deref() == Some(MARKER)
    }

    /// Serialize to the JSON wire form
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON wire form
    pub fn decode(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Milliseconds since the task was created
    pub fn lifetime_elapsed(&self, now: i64) -> i64 {
        now.saturating_sub(self.status.gen_timestamp)
    }

    /// Milliseconds since the task was last dequeued for execution
    pub fn attempt_elapsed(&self, now: i64) -> i64 {
        now.saturating_sub(self.status.exc_timestamp)
    }

    /// Get task description
    pub fn description(&self) -> String {
        format!(
            "Task[type={}, queue={}, id={}, state={}, retry={}]",
            self.task_type.as_deref().unwrap_or("-"),
            self.queue,
            self.id,
            self.status.state,
            self.status.retry
        )
    }
}
