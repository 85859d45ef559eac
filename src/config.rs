use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_COLLECTOR_URL: &str = "http://127.0.0.1:8080/api/statistics/record/batch";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_CHECKPOINT_DIR: &str = "/tmp";

pub const LOG_FILE_ENV: &str = "DLSTATS_LOG_FILE";
pub const COLLECTOR_URL_ENV: &str = "DLSTATS_COLLECTOR_URL";
pub const BATCH_SIZE_ENV: &str = "DLSTATS_BATCH_SIZE";
pub const CHECKPOINT_DIR_ENV: &str = "DLSTATS_CHECKPOINT_DIR";
pub const CHECKPOINT_DB_ENV: &str = "DLSTATS_CHECKPOINT_DB";

/// Where checkpoints live: one position file per log, or one SQLite database
/// for all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointBackend {
    File { dir: PathBuf },
    Sqlite { db_path: PathBuf },
}

/// Runtime configuration, built once at startup by one of the two adapters
/// and passed by reference into the pipeline. Nothing reads environment
/// variables after this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_file: PathBuf,
    pub collector_url: String,
    pub batch_size: usize,
    pub checkpoint: CheckpointBackend,
}

impl Config {
    pub fn new(
        log_file: impl AsRef<str>,
        collector_url: impl Into<String>,
        batch_size: usize,
        checkpoint_dir: impl AsRef<str>,
        checkpoint_db: Option<String>,
    ) -> Result<Self> {
        let collector_url = collector_url.into();
        url::Url::parse(&collector_url)
            .with_context(|| format!("collector url {collector_url:?} is not a valid URL"))?;

        let checkpoint = match checkpoint_db {
            Some(db_path) => CheckpointBackend::Sqlite {
                db_path: expand_path(&db_path),
            },
            None => CheckpointBackend::File {
                dir: expand_path(checkpoint_dir.as_ref()),
            },
        };

        Ok(Self {
            log_file: expand_path(log_file.as_ref()),
            collector_url,
            // A zero threshold would dispatch nothing; treat it as "every line".
            batch_size: batch_size.max(1),
            checkpoint,
        })
    }

    /// Environment-only construction for the cron adapter. A missing log file
    /// variable is the one configuration error that aborts the process.
    pub fn from_env() -> Result<Self> {
        let log_file = std::env::var(LOG_FILE_ENV)
            .with_context(|| format!("{LOG_FILE_ENV} must be set to the access log path"))?;
        let collector_url =
            env_or(COLLECTOR_URL_ENV, DEFAULT_COLLECTOR_URL);
        let batch_size = match std::env::var(BATCH_SIZE_ENV) {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{BATCH_SIZE_ENV} must be a positive integer, got {raw:?}"))?,
            Err(_) => DEFAULT_BATCH_SIZE,
        };
        let checkpoint_dir = env_or(CHECKPOINT_DIR_ENV, DEFAULT_CHECKPOINT_DIR);
        let checkpoint_db = std::env::var(CHECKPOINT_DB_ENV).ok();

        Self::new(log_file, collector_url, batch_size, checkpoint_dir, checkpoint_db)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_file_backend_by_default() {
        let config = Config::new(
            "/var/log/nginx/download_stats.log",
            DEFAULT_COLLECTOR_URL,
            DEFAULT_BATCH_SIZE,
            "/var/lib/dlstats",
            None,
        )
        .expect("config builds");

        assert_eq!(
            config.log_file,
            PathBuf::from("/var/log/nginx/download_stats.log")
        );
        assert_eq!(config.batch_size, 100);
        assert_eq!(
            config.checkpoint,
            CheckpointBackend::File {
                dir: PathBuf::from("/var/lib/dlstats")
            }
        );
    }

    #[test]
    fn checkpoint_db_selects_sqlite_backend() {
        let config = Config::new(
            "dl.log",
            DEFAULT_COLLECTOR_URL,
            50,
            DEFAULT_CHECKPOINT_DIR,
            Some("/var/lib/dlstats/positions.db".to_string()),
        )
        .expect("config builds");

        assert_eq!(
            config.checkpoint,
            CheckpointBackend::Sqlite {
                db_path: PathBuf::from("/var/lib/dlstats/positions.db")
            }
        );
    }

    #[test]
    fn rejects_invalid_collector_url() {
        let err = Config::new("dl.log", "not a url", 100, "/tmp", None)
            .expect_err("bad url must be rejected");
        assert!(err.to_string().contains("not a valid URL"));
    }

    #[test]
    fn clamps_zero_batch_size() {
        let config =
            Config::new("dl.log", DEFAULT_COLLECTOR_URL, 0, "/tmp", None).expect("config builds");
        assert_eq!(config.batch_size, 1);
    }
}
