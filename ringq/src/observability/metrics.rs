//! Prometheus metrics collector for ringq
//!
//! Counts queue traffic, backup ring activity and lock acquisitions.

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// ringq metrics collector
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct RingqMetrics {
    registry: Arc<Registry>,

    // Queue counters
    tasks_pushed_total: IntCounterVec,
    tasks_duplicate_total: IntCounterVec,
    tasks_popped_total: IntCounterVec,
    tasks_shadowed_total: IntCounterVec,
    tasks_finished_total: IntCounterVec,

    // Monitor counters
    tasks_retried_total: IntCounterVec,
    tasks_dead_lettered_total: IntCounterVec,
    backup_queue_length: IntGaugeVec,

    // Lock counters
    lock_acquired_total: IntCounterVec,
}

impl RingqMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_pushed_total = IntCounterVec::new(
            Opts::new("ringq_tasks_pushed_total", "Total number of tasks pushed"),
            &["queue"]
        )?;

        let tasks_duplicate_total = IntCounterVec::new(
            Opts::new("ringq_tasks_duplicate_total", "Total number of unique pushes rejected as duplicates"),
            &["queue"]
        )?;

        let tasks_popped_total = IntCounterVec::new(
            Opts::new("ringq_tasks_popped_total", "Total number of tasks popped for execution"),
            &["queue"]
        )?;

        let tasks_shadowed_total = IntCounterVec::new(
            Opts::new("ringq_tasks_shadowed_total", "Total number of tasks copied into the backup ring"),
            &["queue"]
        )?;

        let tasks_finished_total = IntCounterVec::new(
            Opts::new("ringq_tasks_finished_total", "Total number of tasks finished"),
            &["queue"]
        )?;

        let tasks_retried_total = IntCounterVec::new(
            Opts::new("ringq_tasks_retried_total", "Total number of monitor-driven retries"),
            &["queue"]
        )?;

        let tasks_dead_lettered_total = IntCounterVec::new(
            Opts::new("ringq_tasks_dead_lettered_total", "Total number of tasks handed to the dead-letter pipeline"),
            &["queue", "reason"]
        )?;

        let backup_queue_length = IntGaugeVec::new(
            Opts::new("ringq_backup_queue_length", "Entries in the backup ring after the last monitor pass"),
            &["backup_queue"]
        )?;

        let lock_acquired_total = IntCounterVec::new(
            Opts::new("ringq_lock_acquired_total", "Total number of distributed lock acquisitions"),
            &["key"]
        )?;

        registry.register(Box::new(tasks_pushed_total.clone()))?;
        registry.register(Box::new(tasks_duplicate_total.clone()))?;
        registry.register(Box::new(tasks_popped_total.clone()))?;
        registry.register(Box::new(tasks_shadowed_total.clone()))?;
        registry.register(Box::new(tasks_finished_total.clone()))?;
        registry.register(Box::new(tasks_retried_total.clone()))?;
        registry.register(Box::new(tasks_dead_lettered_total.clone()))?;
        registry.register(Box::new(backup_queue_length.clone()))?;
        registry.register(Box::new(lock_acquired_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            tasks_pushed_total,
            tasks_duplicate_total,
            tasks_popped_total,
            tasks_shadowed_total,
            tasks_finished_total,
            tasks_retried_total,
            tasks_dead_lettered_total,
            backup_queue_length,
            lock_acquired_total,
        })
    }

    /// Record a task pushed onto its main list
    pub fn record_pushed(&self, queue: &str) {
        self.tasks_pushed_total.with_label_values(&[queue]).inc();
    }

    /// Record a unique push rejected by the dedup set
    pub fn record_duplicate(&self, queue: &str) {
        self.tasks_duplicate_total.with_label_values(&[queue]).inc();
    }

    /// Record a task popped for execution
    pub fn record_popped(&self, queue: &str) {
        self.tasks_popped_total.with_label_values(&[queue]).inc();
    }

    /// Record a shadow copy written to the backup ring
    pub fn record_shadowed(&self, queue: &str) {
        self.tasks_shadowed_total.with_label_values(&[queue]).inc();
    }

    /// Record a finished task
    pub fn record_finished(&self, queue: &str) {
        self.tasks_finished_total.with_label_values(&[queue]).inc();
    }

    /// Record a monitor-driven retry
    pub fn record_retried(&self, queue: &str) {
        self.tasks_retried_total.with_label_values(&[queue]).inc();
    }

    /// Record a dead-lettered task; `reason` is `expired` or `exhausted`
    pub fn record_dead_lettered(&self, queue: &str, reason: &str) {
        self.tasks_dead_lettered_total
            .with_label_values(&[queue, reason])
            .inc();
    }

    /// Update the backup ring length gauge
    pub fn update_backup_queue_length(&self, backup_queue: &str, length: u64) {
        self.backup_queue_length
            .with_label_values(&[backup_queue])
            .set(i64::try_from(length).unwrap_or(i64::MAX));
    }

    /// Record a distributed lock acquisition
    pub fn record_lock_acquired(&self, key: &str) {
        self.lock_acquired_total.with_label_values(&[key]).inc();
    }

    /// Get the registry for custom metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }
}
