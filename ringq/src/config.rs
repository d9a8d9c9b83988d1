//! ringq configuration module
//!
//! Immutable configuration structs for the queue manager, the backup ring
//! monitor and the distributed lock. Each is validated once, when the
//! component that consumes it is constructed.

use crate::{Error, Result};
use std::time::Duration;

/// Default per-lock acquire timeout
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lock expiry
pub const DEFAULT_LOCK_EXPIRY: Duration = Duration::from_secs(60);

/// Default sleep between lock acquire attempts
pub const DEFAULT_ACQUIRE_RESOLUTION: Duration = Duration::from_millis(100);

/// Default number of monitor-driven retries
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// Delivery mode of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Plain blocking pop, no reliability bookkeeping
    #[default]
    Default,
    /// Every dequeue is shadowed into the backup ring
    Safe,
}

impl QueueMode {
    /// Parse a mode suffix; an empty suffix means [`QueueMode::Default`]
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.trim() {
            "" | "default" => Ok(QueueMode::Default),
            "safe" => Ok(QueueMode::Safe),
            other => Err(Error::Config(format!("invalid queue mode: {}", other))),
        }
    }
}

impl std::fmt::Display for QueueMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueMode::Default => write!(f, "default"),
            QueueMode::Safe => write!(f, "safe"),
        }
    }
}

/// A queue name with its mode, parsed from `name[:mode]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name, also the key of its list
    pub name: String,
    /// Delivery mode
    pub mode: QueueMode,
}

impl QueueSpec {
    /// Parse `orders`, `orders:safe` or `orders:default`
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.trim().splitn(2, ':');
        let name = parts.next().unwrap_or_default().trim();
        let mode = QueueMode::parse(parts.next().unwrap_or_default())?;

        if name.is_empty() {
            return Err(Error::Config(format!("queue name is empty in spec '{}'", spec)));
        }

        Ok(Self {
            name: name.to_string(),
            mode,
        })
    }
}

/// Convert a configured timeout into an elapsed-millis limit; zero means unlimited
pub fn limit_millis(timeout: Duration) -> i64 {
    if timeout.is_zero() {
        i64::MAX
    } else {
        i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Queue manager configuration
#[derive(Debug, Clone, Default)]
pub struct QueueManagerConfig {
    /// Queue specs, `name` or `name:safe`
    pub queues: Vec<String>,

    /// Total lifetime of a SAFE task from creation; zero means unlimited
    pub alive_timeout: Duration,
}

impl QueueManagerConfig {
    /// Create a configuration for the given queue specs
    pub fn new<S: AsRef<str>>(queues: &[S]) -> Self {
        Self {
            queues: queues.iter().map(|q| q.as_ref().to_string()).collect(),
            alive_timeout: Duration::ZERO,
        }
    }

    /// Set the task lifetime limit
    #[must_use]
    pub fn with_alive_timeout(mut self, timeout: Duration) -> Self {
        self.alive_timeout = timeout;
        self
    }

    /// Parse every queue spec, failing on the first invalid one
    pub fn specs(&self) -> Result<Vec<QueueSpec>> {
        if self.queues.is_empty() {
            return Err(Error::Config("at least one queue must be specified".into()));
        }
        self.queues.iter().map(|q| QueueSpec::parse(q)).collect()
    }

    /// Lifetime limit in millis
    pub fn alive_timeout_millis(&self) -> i64 {
        limit_millis(self.alive_timeout)
    }
}

/// Backup ring monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Name of the ring to scan
    pub backup_queue_name: String,

    /// Total lifetime of a task from creation; zero means unlimited
    pub alive_timeout: Duration,

    /// Budget of a single execution attempt; zero means unlimited
    pub protected_timeout: Duration,

    /// Retries before a timed-out task is dead-lettered
    pub retry_times: u32,
}

impl MonitorConfig {
    /// Create a configuration for the given ring
    pub fn new(backup_queue_name: impl Into<String>) -> Self {
        Self {
            backup_queue_name: backup_queue_name.into(),
            alive_timeout: Duration::ZERO,
            protected_timeout: Duration::ZERO,
            retry_times: DEFAULT_RETRY_TIMES,
        }
    }

    /// Set the task lifetime limit
    #[must_use]
    pub fn with_alive_timeout(mut self, timeout: Duration) -> Self {
        self.alive_timeout = timeout;
        self
    }

    /// Set the per-attempt execution budget
    #[must_use]
    pub fn with_protected_timeout(mut self, timeout: Duration) -> Self {
        self.protected_timeout = timeout;
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn with_retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backup_queue_name.trim().is_empty() {
            return Err(Error::Config("backup_queue_name cannot be empty".into()));
        }
        Ok(())
    }

    /// Lifetime limit in millis
    pub fn alive_timeout_millis(&self) -> i64 {
        limit_millis(self.alive_timeout)
    }

    /// Per-attempt limit in millis
    pub fn protected_timeout_millis(&self) -> i64 {
        limit_millis(self.protected_timeout)
    }
}

/// Distributed lock configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How long `acquire` keeps trying
    pub acquire_timeout: Duration,

    /// Lifetime of an acquired lock record
    pub expiry: Duration,

    /// Sleep between acquire attempts
    pub resolution: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            expiry: DEFAULT_LOCK_EXPIRY,
            resolution: DEFAULT_ACQUIRE_RESOLUTION,
        }
    }
}

impl LockConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the acquire timeout
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the lock expiry
    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Set the sleep between attempts
    #[must_use]
    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.expiry.is_zero() {
            return Err(Error::Config("lock expiry must be greater than 0".into()));
        }
        if self.resolution.is_zero() {
            return Err(Error::Config("lock resolution must be greater than 0".into()));
        }
        Ok(())
    }
}
