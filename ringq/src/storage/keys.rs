//! Redis Key manager
//!
//! Provides the key naming convention shared by every process that manages
//! the same set of queues.

use base64::Engine;

/// Suffix of the per-queue uniqueness set
pub const UNIQUE_SUFFIX: &str = "_unique";

/// Prefix of backup ring names
pub const BACKUP_QUEUE_PREFIX: &str = "back_up_queue_";

/// Suffix of the liveness marker a running task may refresh
pub const ALIVE_SUFFIX: &str = "_alive";

/// Suffix of the lock used to single-instance the monitor of a ring
pub const MONITOR_LOCK_SUFFIX: &str = "_monitor_lock";

/// Redis Key manager
#[derive(Debug, Clone)]
pub struct Keys;

impl Keys {
    /// Main task list (List). The queue name is the key.
    /// Example: orders
    pub fn queue(queue_name: &str) -> String {
        queue_name.to_string()
    }

    /// Uniqueness set of a SAFE queue (Set)
    /// Example: orders_unique
    pub fn unique(queue_name: &str) -> String {
        format!("{}{}", queue_name, UNIQUE_SUFFIX)
    }

    /// Liveness marker of a task (String)
    /// Example: 4f1c...-..._alive
    pub fn alive(task_id: &str) -> String {
        format!("{}{}", task_id, ALIVE_SUFFIX)
    }

    /// Monitor lock of a backup ring (String)
    /// Example: back_up_queue_XrY7u+Ae7tCTyyK7j1rNww==_monitor_lock
    pub fn monitor_lock(backup_queue_name: &str) -> String {
        format!("{}{}", backup_queue_name, MONITOR_LOCK_SUFFIX)
    }

    /// Backup ring shared by all SAFE queues of a manager (List)
    ///
    /// Mode suffixes are stripped and the names sorted and de-duplicated, so
    /// processes configured with the same queue set in any order agree on
    /// the key.
    pub fn backup_queue<S: AsRef<str>>(queues: &[S]) -> String {
        let mut names: Vec<&str> = queues
            .iter()
            .map(|q| strip_mode(q.as_ref()))
            .filter(|q| !q.is_empty())
            .collect();
        names.sort_unstable();
        names.dedup();

        let digest = md5::compute(names.concat().as_bytes());
        format!(
            "{}{}",
            BACKUP_QUEUE_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(digest.0)
        )
    }
}

/// Queue name without its `:mode` suffix
fn strip_mode(spec: &str) -> &str {
    spec.trim().split(':').next().unwrap_or_default().trim()
}
