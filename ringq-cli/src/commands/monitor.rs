//! Monitor command handler

use color_eyre::Result;
use ringq::config::MonitorConfig;
use ringq::monitor::{BackupQueueMonitor, LoggingPipeline, RedisAliveDetector};
use ringq::server::{MonitorRunner, MonitorRunnerConfig};
use ringq::storage::{Keys, Store};
use std::sync::Arc;
use std::time::Duration;

/// Monitor command options
#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub alive_timeout_ms: u64,
    pub protected_timeout_ms: u64,
    pub retry_times: u32,
    pub interval_ms: u64,
    pub once: bool,
}

/// Run the monitor over the ring of `queues` until Ctrl-C, or once
pub async fn run(store: &Arc<dyn Store>, queues: &[String], options: MonitorOptions) -> Result<()> {
    let config = MonitorConfig::new(Keys::backup_queue(queues))
        .with_alive_timeout(Duration::from_millis(options.alive_timeout_ms))
        .with_protected_timeout(Duration::from_millis(options.protected_timeout_ms))
        .with_retry_times(options.retry_times);

    let monitor = BackupQueueMonitor::new(store.clone(), config)?
        .pipeline(LoggingPipeline)
        .alive_detector(RedisAliveDetector);
    let runner = MonitorRunner::new(
        monitor,
        MonitorRunnerConfig::new().interval(Duration::from_millis(options.interval_ms)),
    )?;

    if options.once {
        match runner.run_once().await? {
            Some(report) => println!("{}", report),
            None => println!("Lock {} is held by another monitor, pass skipped", runner.lock_key()),
        }
        return Ok(());
    }

    let runner = Arc::new(runner);
    let handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, stopping monitor");
    runner.shutdown();
    handle.await?;
    Ok(())
}
