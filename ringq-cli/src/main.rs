//! ringq CLI - push, pop and inspect SAFE queues, run the backup ring monitor

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringq")]
#[command(about = "ringq CLI - Redis list queues with a backup ring", long_about = None)]
#[command(version)]
struct Cli {
    /// Redis server URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379", global = true)]
    redis_url: String,

    /// Full queue configuration (`name[:safe]`, comma separated); defaults to the queue named by the command
    #[arg(long = "queue-set", id = "queue_set", env = "RINGQ_QUEUES", value_delimiter = ',', global = true)]
    queue_set: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a task
    Push {
        /// Queue spec, e.g. `orders:safe`
        queue: String,
        /// Task payload
        payload: String,
        /// Task ID (random UUID when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Task type
        #[arg(long = "type")]
        task_type: Option<String>,
        /// Reject the push while a task with the same ID is queued or in flight
        #[arg(long, default_value_t = false)]
        unique: bool,
    },
    /// Pop one task, print it and finish it
    Pop {
        /// Queue spec, e.g. `orders:safe`
        queue: String,
        /// How long to wait for a task
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },
    /// Show the backup ring of a queue set
    Ring {
        /// Queue specs, as configured in the queue manager
        #[arg(required = true)]
        queues: Vec<String>,
    },
    /// Run the backup ring monitor
    Monitor {
        /// Queue specs, as configured in the queue manager
        #[arg(required = true)]
        queues: Vec<String>,
        /// Task lifetime (0 = unlimited)
        #[arg(long, default_value = "0")]
        alive_timeout_ms: u64,
        /// Per-attempt timeout (0 = unlimited)
        #[arg(long, default_value = "0")]
        protected_timeout_ms: u64,
        /// Redeliveries before a task is dead-lettered
        #[arg(long, default_value_t = ringq::config::DEFAULT_RETRY_TIMES)]
        retry_times: u32,
        /// Interval between passes
        #[arg(long, default_value = "30000")]
        interval_ms: u64,
        /// Run a single pass and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Take a distributed lock, hold it, release it
    Lock {
        /// Lock key
        key: String,
        /// How long to hold the lock
        #[arg(long, default_value = "5000")]
        hold_ms: u64,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ringq=info")),
        )
        .init();

    let cli = Cli::parse();
    let store = commands::connect(&cli.redis_url).await?;

    match cli.command {
        Commands::Push { queue, payload, id, task_type, unique } => {
            let manager = commands::manager(&store, &cli.queue_set, &[queue.clone()]).await?;
            commands::queue::push(&manager, &queue, payload, id, task_type, unique).await?;
        }
        Commands::Pop { queue, timeout_ms } => {
            let manager = commands::manager(&store, &cli.queue_set, &[queue.clone()]).await?;
            commands::queue::pop(&manager, &queue, timeout_ms).await?;
        }
        Commands::Ring { queues } => {
            commands::queue::ring(&store, &queues).await?;
        }
        Commands::Monitor {
            queues,
            alive_timeout_ms,
            protected_timeout_ms,
            retry_times,
            interval_ms,
            once,
        } => {
            let options = commands::monitor::MonitorOptions {
                alive_timeout_ms,
                protected_timeout_ms,
                retry_times,
                interval_ms,
                once,
            };
            commands::monitor::run(&store, &queues, options).await?;
        }
        Commands::Lock { key, hold_ms } => {
            commands::lock::hold(&store, &key, hold_ms).await?;
        }
    }

    Ok(())
}
