// ============================================
// File: crates/wiretape/src/playback/report.rs
// ============================================
//! # Playback Reporting
//!
//! Per-op execution stats written as JSON lines, plus the run summary.
//!
//! Main Components:
//!   - OpStat: One executed op (timing, latency, outcome)
//!   - StatSender: Cloneable handle sessions use to submit stats
//!   - StatReporter: Background task writing stats to a file
//!   - PlaybackReport: Totals for a whole run
//!
//! ⚠️ Important Note for Next Developer:
//!   - Offsets are microseconds from the start of the run, not wall-clock
//!   - A disabled sender drops stats without allocating a channel
//!
//! Last Modified: v0.1.0 - Initial reporting
// ============================================

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ReplayError, Result};

const STAT_CHANNEL_DEPTH: usize = 4096;

// ============================================
// OpStat
// ============================================

/// Execution record for one replayed op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpStat {
    /// Position of the op in the recording.
    pub order: u64,
    /// Op kind name.
    pub op: String,
    /// Target namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    /// Recorded connection the op belongs to.
    pub connection_num: u64,
    /// Scheduled time, from the start of the run.
    pub play_at_offset_us: i64,
    /// Actual send time, from the start of the run.
    pub played_at_offset_us: i64,
    /// `played_at - play_at`.
    pub lag_us: i64,
    /// Send-to-reply time for ops that expect a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<u64>,
    /// Documents in the live reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_returned: Option<usize>,
    /// Cursor id in the live reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_id: Option<i64>,
    /// Error message if execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================
// StatSender
// ============================================

/// Cloneable handle for submitting stats.
#[derive(Debug, Clone)]
pub struct StatSender {
    tx: Option<mpsc::Sender<OpStat>>,
}

impl StatSender {
    /// Creates a sender that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Returns `true` if stats are being written somewhere.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Submits one stat.
    pub async fn send(&self, stat: OpStat) {
        if let Some(ref tx) = self.tx {
            if tx.send(stat).await.is_err() {
                debug!("Stat reporter gone, dropping stat");
            }
        }
    }
}

// ============================================
// StatReporter
// ============================================

/// Background JSON-lines writer for `OpStat`s.
#[derive(Debug)]
pub struct StatReporter {
    tx: mpsc::Sender<OpStat>,
    task: JoinHandle<Result<u64>>,
}

impl StatReporter {
    /// Creates the report file and starts the writer task.
    ///
    /// # Errors
    /// Returns `LogOpen` if the file cannot be created.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).await.map_err(|source| ReplayError::LogOpen {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "Writing execution report");
        Ok(Self::from_writer(file))
    }

    /// Starts the writer task over any writer.
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STAT_CHANNEL_DEPTH);
        let task = tokio::spawn(write_stats(BufWriter::new(writer), rx));
        Self { tx, task }
    }

    /// Handle for sessions.
    #[must_use]
    pub fn sender(&self) -> StatSender {
        StatSender {
            tx: Some(self.tx.clone()),
        }
    }

    /// Waits for every outstanding stat to be written.
    ///
    /// All senders must be dropped first or this never returns.
    ///
    /// # Errors
    /// Returns error if writing failed.
    pub async fn finish(self) -> Result<u64> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| ReplayError::task_failed(format!("stat reporter: {e}")))?
    }
}

async fn write_stats<W>(mut writer: BufWriter<W>, mut rx: mpsc::Receiver<OpStat>) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut written = 0u64;
    while let Some(stat) = rx.recv().await {
        let mut line = match serde_json::to_vec(&stat) {
            Ok(line) => line,
            Err(e) => {
                warn!(order = stat.order, error = %e, "Failed to serialize stat");
                continue;
            }
        };
        line.push(b'\n');
        writer.write_all(&line).await?;
        written += 1;
    }
    writer.flush().await?;
    Ok(written)
}

// ============================================
// PlaybackReport
// ============================================

/// Totals for one playback run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Records read from the log, over all passes.
    pub ops_read: u64,
    /// Ops sent without error.
    pub ops_executed: u64,
    /// Ops whose send or reply failed.
    pub ops_failed: u64,
    /// Unknown ops not sent.
    pub ops_skipped: u64,
    /// Recorded replies used for cursor pairing.
    pub replies_consumed: u64,
    /// Ops dropped because their session could not connect or shut down.
    pub ops_dropped: u64,
    /// Sessions created.
    pub connections: u64,
    /// Sessions whose live connection could not be opened.
    pub connect_failures: u64,
    /// Passes over the log.
    pub generations: u32,
    /// Worst observed lag behind schedule.
    pub max_lag: Duration,
    /// Stats written to the report file.
    pub stats_written: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl PlaybackReport {
    /// Ops handed to sessions for sending.
    #[must_use]
    pub const fn ops_dispatched(&self) -> u64 {
        self.ops_executed + self.ops_failed + self.ops_dropped
    }

    /// Logs the report at info level.
    pub fn log(&self) {
        info!(
            ops_read = self.ops_read,
            executed = self.ops_executed,
            failed = self.ops_failed,
            skipped = self.ops_skipped,
            dropped = self.ops_dropped,
            replies = self.replies_consumed,
            connections = self.connections,
            connect_failures = self.connect_failures,
            generations = self.generations,
            max_lag_ms = self.max_lag.as_millis(),
            elapsed_ms = self.elapsed.as_millis(),
            "Playback finished"
        );
        if self.ops_dropped > 0 {
            warn!(dropped = self.ops_dropped, "Some ops were never sent");
        }
    }
}
