use crate::config::CheckpointBackend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task;
use tracing::{debug, warn};

/// Durable byte-offset storage, keyed by the log file's base name.
///
/// `get` never fails: a missing entry, a value that cannot be read back as an
/// integer, or an I/O error all mean "start from the beginning". `set`
/// surfaces its error so the orchestrator can log it; a failed write costs at
/// most a re-send on the next run.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, log_file: &Path) -> u64;
    async fn set(&self, log_file: &Path, offset: u64) -> Result<()>;
}

/// Open the checkpoint store selected by the configuration.
pub fn open_store(backend: &CheckpointBackend) -> Result<Box<dyn CheckpointStore>> {
    match backend {
        CheckpointBackend::File { dir } => Ok(Box::new(FileCheckpointStore::new(dir.clone()))),
        CheckpointBackend::Sqlite { db_path } => {
            Ok(Box::new(SqliteCheckpointStore::new(db_path)?))
        }
    }
}

fn file_identity(log_file: &Path) -> String {
    log_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| log_file.to_string_lossy().into_owned())
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// Plain-file backend: one small text file per tailed log, holding the
/// decimal offset. Writes land in a temp file first and are renamed into
/// place so a crash mid-write cannot leave a half-written offset behind.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    prefix: String,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "dlstats_position".to_string(),
        }
    }

    fn position_file_name(&self, log_file: &Path) -> String {
        format!("{}.{}", self.prefix, file_identity(log_file))
    }

    fn position_file(&self, log_file: &Path) -> PathBuf {
        self.dir.join(self.position_file_name(log_file))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, log_file: &Path) -> u64 {
        let path = self.position_file(log_file);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(offset) => offset,
                Err(_) => {
                    warn!(
                        path = %path.display(),
                        "checkpoint file does not hold a valid offset; starting from 0"
                    );
                    0
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no checkpoint recorded yet");
                0
            }
            Err(err) => {
                warn!(
                    error = %err,
                    path = %path.display(),
                    "failed to read checkpoint; starting from 0"
                );
                0
            }
        }
    }

    async fn set(&self, log_file: &Path, offset: u64) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.with_context(|| {
            format!(
                "failed to create checkpoint directory {}",
                self.dir.display()
            )
        })?;

        let final_path = self.position_file(log_file);
        let temp_path = self.dir.join(format!(
            "{}.{}.tmp",
            self.position_file_name(log_file),
            std::process::id()
        ));

        tokio::fs::write(&temp_path, offset.to_string())
            .await
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &final_path)
            .await
            .with_context(|| {
                format!(
                    "failed to rename {} to {}",
                    temp_path.display(),
                    final_path.display()
                )
            })?;

        debug!(path = %final_path.display(), offset, "checkpoint committed");
        Ok(())
    }
}

/// SQLite backend: a single database holding one row per log file. Useful
/// when several logs are shipped from the same host and scattered position
/// files become a nuisance.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    path: Arc<PathBuf>,
}

impl SqliteCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create checkpoint directory {}", parent.display())
            })?;
        }

        let conn = open_connection(&path)?;
        initialize_schema(&conn)?;

        Ok(Self {
            path: Arc::new(path),
        })
    }

    async fn read_offset(&self, log_file: &Path) -> Result<Option<u64>> {
        let db_path = self.path.clone();
        let file_name = file_identity(log_file);
        task::spawn_blocking(move || {
            let conn = open_connection(&db_path)?;
            let offset = conn
                .query_row(
                    "SELECT byte_offset FROM positions WHERE file_name = ?1",
                    params![file_name],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
                .context("failed to query positions table")?;

            Ok::<_, anyhow::Error>(offset.map(|value| value.max(0) as u64))
        })
        .await
        .context("checkpoint get join error")?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, log_file: &Path) -> u64 {
        match self.read_offset(log_file).await {
            Ok(Some(offset)) => offset,
            Ok(None) => {
                debug!(db = %self.path.display(), "no checkpoint recorded yet");
                0
            }
            Err(err) => {
                warn!(
                    error = %err,
                    db = %self.path.display(),
                    "failed to read checkpoint; starting from 0"
                );
                0
            }
        }
    }

    async fn set(&self, log_file: &Path, offset: u64) -> Result<()> {
        let db_path = self.path.clone();
        let file_name = file_identity(log_file);
        let timestamp = unix_timestamp();
        task::spawn_blocking(move || {
            let conn = open_connection(&db_path)?;
            conn.execute(
                "
                INSERT INTO positions (file_name, byte_offset, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(file_name) DO UPDATE SET
                    byte_offset = excluded.byte_offset,
                    updated_at = excluded.updated_at
                ",
                params![file_name, offset as i64, timestamp],
            )
            .context("failed to upsert checkpoint row")?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .context("checkpoint set join error")??;

        Ok(())
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open checkpoint db {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL mode for checkpoint db")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set checkpoint db synchronous mode")?;

    Ok(conn)
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS positions (
            file_name TEXT PRIMARY KEY,
            byte_offset INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        ",
    )
    .context("failed to create positions table")?;

    Ok(())
}
