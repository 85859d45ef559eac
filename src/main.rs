//! CLI adapter: the access log is a positional argument, everything else is
//! flags with environment fallbacks. Pipeline failures are logged and exit
//! cleanly; only an invalid invocation exits non-zero.

use anyhow::Result;
use clap::Parser;
use dlstats_agent::config::{self, Config};
use dlstats_agent::tailer;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "dlstats-agent",
    about = "Ship download statistics from an nginx access log to the collector"
)]
struct Cli {
    /// Access log to process
    log_file: String,

    /// Collector batch endpoint
    #[arg(
        long,
        env = config::COLLECTOR_URL_ENV,
        default_value = config::DEFAULT_COLLECTOR_URL
    )]
    collector_url: String,

    /// Records per dispatch
    #[arg(long, env = config::BATCH_SIZE_ENV, default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Directory for per-log checkpoint files
    #[arg(long, env = config::CHECKPOINT_DIR_ENV, default_value = config::DEFAULT_CHECKPOINT_DIR)]
    checkpoint_dir: String,

    /// Keep checkpoints in this SQLite database instead of plain files
    #[arg(long, env = config::CHECKPOINT_DB_ENV)]
    checkpoint_db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::new(
        cli.log_file,
        cli.collector_url,
        cli.batch_size,
        cli.checkpoint_dir,
        cli.checkpoint_db,
    )?;

    if let Err(err) = tailer::run(&config).await {
        error!(error = %err, "tail run failed");
    }

    Ok(())
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
