use crate::checkpoint::{self, CheckpointStore};
use crate::config::Config;
use crate::dispatch::{HttpCollector, StatSink};
use crate::extract::extract_download_request;
use crate::parser::AccessLogParser;
use crate::record::{build_record, StatRecord};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::{debug, error, info, warn};

/// What one run did, for the adapters' closing log line and for tests.
///
/// `end_offset` is the offset reached by the last confirmed batch, i.e. the
/// value the checkpoint was advanced to. An aborted run leaves it at the last
/// successful commit, not at the read position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub start_offset: u64,
    pub end_offset: u64,
    pub lines_read: u64,
    pub records_built: u64,
    pub batches_sent: u64,
    pub records_sent: u64,
    pub aborted: bool,
}

/// Wire the configured collector and checkpoint backend to the pipeline and
/// process one run. Both binaries call this; they differ only in how the
/// [`Config`] was built.
pub async fn run(config: &Config) -> Result<RunSummary> {
    let parser = AccessLogParser::new();
    let checkpoints = checkpoint::open_store(&config.checkpoint)?;
    let sink = HttpCollector::new(config.collector_url.clone())?;

    process_log_file(
        &config.log_file,
        &parser,
        checkpoints.as_ref(),
        &sink,
        config.batch_size,
    )
    .await
}

/// Tail one log file from its checkpoint to end-of-file.
///
/// Every line advances the candidate checkpoint position whether or not it
/// produces a record. The stored checkpoint only moves after the sink has
/// confirmed the batch containing that line, so a crash or dispatch failure
/// re-reads (at worst re-sends) instead of losing lines. A dispatch failure
/// aborts the rest of the run; buffered records are dropped and will be
/// re-derived from the file next run.
pub async fn process_log_file(
    log_file: &Path,
    parser: &AccessLogParser,
    checkpoints: &dyn CheckpointStore,
    sink: &dyn StatSink,
    batch_size: usize,
) -> Result<RunSummary> {
    let batch_size = batch_size.max(1);

    let metadata = match tokio::fs::metadata(log_file).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %log_file.display(), "log file does not exist; nothing to process");
            return Ok(RunSummary::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", log_file.display()))
        }
    };

    let start_offset = checkpoints.get(log_file).await;
    let mut summary = RunSummary {
        start_offset,
        end_offset: start_offset,
        ..RunSummary::default()
    };

    if start_offset > metadata.len() {
        // Commits are monotonic, so the offset is never rewound; rotate the
        // checkpoint together with the log to start over.
        warn!(
            path = %log_file.display(),
            checkpoint = start_offset,
            file_size = metadata.len(),
            "checkpoint is beyond the current file size; log was likely rotated, skipping run"
        );
        return Ok(summary);
    }

    let mut file = File::open(log_file)
        .await
        .with_context(|| format!("failed to open {}", log_file.display()))?;
    file.seek(SeekFrom::Start(start_offset))
        .await
        .with_context(|| {
            format!(
                "failed to seek {} to offset {start_offset}",
                log_file.display()
            )
        })?;
    let mut reader = BufReader::new(file);

    info!(path = %log_file.display(), offset = start_offset, "starting tail run");

    let mut position = start_offset;
    let mut batch: Vec<StatRecord> = Vec::new();
    let mut line_buf: Vec<u8> = Vec::new();

    loop {
        line_buf.clear();
        let bytes_read = reader
            .read_until(b'\n', &mut line_buf)
            .await
            .with_context(|| format!("failed to read from {}", log_file.display()))?;
        if bytes_read == 0 {
            break;
        }
        position += bytes_read as u64;
        summary.lines_read += 1;

        let line = String::from_utf8_lossy(&line_buf);
        if let Some(parsed) = parser.parse(&line) {
            if let Some(request) = extract_download_request(&parsed.request) {
                debug!(
                    method = %request.method,
                    route_id = request.route_id,
                    "line qualifies as download event"
                );
                batch.push(build_record(&parsed, request));
                summary.records_built += 1;
            }
        }

        if batch.len() >= batch_size
            && !dispatch_and_commit(log_file, checkpoints, sink, &mut batch, position, &mut summary)
                .await
        {
            summary.aborted = true;
            break;
        }
    }

    if !summary.aborted
        && !batch.is_empty()
        && !dispatch_and_commit(log_file, checkpoints, sink, &mut batch, position, &mut summary)
            .await
    {
        summary.aborted = true;
    }

    info!(
        path = %log_file.display(),
        lines_read = summary.lines_read,
        records_sent = summary.records_sent,
        batches_sent = summary.batches_sent,
        end_offset = summary.end_offset,
        aborted = summary.aborted,
        "tail run complete"
    );

    Ok(summary)
}

/// Dispatch the buffered batch and, on confirmation, commit the checkpoint at
/// `position`. Returns false when the dispatch failed; the buffer is cleared
/// either way. A checkpoint write failure is logged but does not fail the
/// batch: the records were delivered, the next run may merely resend them.
async fn dispatch_and_commit(
    log_file: &Path,
    checkpoints: &dyn CheckpointStore,
    sink: &dyn StatSink,
    batch: &mut Vec<StatRecord>,
    position: u64,
    summary: &mut RunSummary,
) -> bool {
    match sink.send_batch(batch).await {
        Ok(()) => {
            summary.batches_sent += 1;
            summary.records_sent += batch.len() as u64;
            summary.end_offset = position;
            if let Err(err) = checkpoints.set(log_file, position).await {
                error!(
                    error = %err,
                    path = %log_file.display(),
                    offset = position,
                    "failed to persist checkpoint; the next run may resend this batch"
                );
            }
            batch.clear();
            true
        }
        Err(err) => {
            warn!(
                error = %err,
                record_count = batch.len(),
                "dispatch failed; aborting run without advancing checkpoint"
            );
            batch.clear();
            false
        }
    }
}
