//! Observability module
//!
//! Prometheus counters for queues, the backup ring monitor and locks.

pub mod metrics;

pub use metrics::RingqMetrics;
