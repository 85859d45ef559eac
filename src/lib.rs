//! Download statistics shipping agent.
//!
//! Tails an nginx access log written with the `download_stats` log format,
//! extracts `/emby_download` events, batches them and POSTs them to the
//! statistics collector. A per-file byte-offset checkpoint makes repeated
//! cron-driven runs resume where the previous run stopped; the checkpoint is
//! only advanced after the collector has confirmed a batch, so delivery is
//! at-least-once.
//!
//! Two overlapping invocations against the same log file and checkpoint are
//! not defended against; schedule runs so they do not overlap.

pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod parser;
pub mod record;
pub mod tailer;
