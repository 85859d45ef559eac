//! Cron adapter: configuration comes entirely from environment variables so
//! a crontab entry stays a one-liner, e.g.
//!
//! ```text
//! */5 * * * * DLSTATS_LOG_FILE=/var/log/nginx/download_stats.log dlstats_cron
//! ```
//!
//! A missing `DLSTATS_LOG_FILE` is the one configuration error that exits
//! non-zero; pipeline failures are logged and the process exits cleanly so
//! the scheduler simply tries again next tick.

use anyhow::Result;
use dlstats_agent::config::Config;
use dlstats_agent::tailer;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;

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
