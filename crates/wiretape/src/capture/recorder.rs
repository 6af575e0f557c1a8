// ============================================
// File: crates/wiretape/src/capture/recorder.rs
// ============================================
//! # Recorder
//!
//! ## Creation Reason
//! Drives one capture session: pulls frames from a `PacketSource`, runs
//! them through reassembly and decoding, restores capture-time order and
//! hands ops to a background log writer.
//!
//! ## Pipeline
//! ```text
//! ┌──────────────┐  frames  ┌─────────────┐  ops  ┌────────────┐
//! │ PacketSource │ ───────► │ Reassembler │ ────► │ OrderedOps │
//! └──────────────┘          └─────────────┘       └─────┬──────┘
//!                                                       │ mpsc
//!                                                 ┌─────▼──────┐
//!                                                 │ log writer │
//!                                                 │   task     │
//!                                                 └────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The pass over packets is strictly sequential; only file writes run
//!   on another task
//! - On shutdown the ops already decoded are still flushed to the log
//!
//! ## Last Modified
//! v0.1.0 - Initial recorder implementation

use std::time::{Duration, Instant};

use tokio::io::AsyncWrite;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use wiretape_common::CaptureTime;
use wiretape_core::OpWithTime;
use wiretape_transport::{parse_frame, PacketSource};

use crate::capture::ordered::OrderedOps;
use crate::capture::reassembly::{Reassembler, ReassemblerConfig, ReassemblyStats};
use crate::config::CaptureConfig;
use crate::error::{ReplayError, Result};
use crate::oplog::OpLogWriter;

/// Depth of the channel between the packet pass and the log writer.
const WRITER_CHANNEL_DEPTH: usize = 1024;

// ============================================
// CaptureSummary
// ============================================

/// Outcome of one capture run.
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    /// Description of the packet source.
    pub source: String,
    /// Reassembly and decode counters.
    pub stats: ReassemblyStats,
    /// Records written to the log.
    pub ops_written: u64,
    /// Timestamp of the first frame.
    pub first_seen: Option<CaptureTime>,
    /// Timestamp of the last frame.
    pub last_seen: Option<CaptureTime>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// `true` if the run ended on shutdown or the op limit.
    pub stopped_early: bool,
}

impl CaptureSummary {
    /// Capture-time span covered by the frames read.
    #[must_use]
    pub fn capture_span(&self) -> Duration {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => last.saturating_duration_since(first),
            _ => Duration::ZERO,
        }
    }
}

// ============================================
// Recorder
// ============================================

/// Turns a packet capture into an operation log.
#[derive(Debug, Clone)]
pub struct Recorder {
    config: CaptureConfig,
}

impl Recorder {
    /// Creates a recorder.
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Reads `source` to the end (or until shutdown) and writes every
    /// decoded op to `writer`.
    ///
    /// # Errors
    /// Returns error if the source fails or the log cannot be written.
    pub async fn run<S, W>(
        &self,
        source: &mut S,
        writer: OpLogWriter<W>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<CaptureSummary>
    where
        S: PacketSource + ?Sized,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let started = Instant::now();
        let description = source.describe();
        info!(source = %description, "Capture started");

        let (tx, rx) = mpsc::channel::<OpWithTime>(WRITER_CHANNEL_DEPTH);
        let writer_task = tokio::spawn(write_log(writer, rx));

        let mut reassembler = Reassembler::new(ReassemblerConfig::from(&self.config));
        let mut ordered = OrderedOps::new(self.config.order_buffer_size);
        let mut completed = Vec::new();
        let mut first_seen = None;
        let mut last_seen = None;
        let mut sent: u64 = 0;
        let mut stopped_early = false;
        let limit = self.config.max_ops;

        let pass = async {
            loop {
                let frame = tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Shutdown requested, finishing capture");
                        stopped_early = true;
                        break;
                    }
                    frame = source.next_packet() => frame?,
                };
                let Some(frame) = frame else {
                    break;
                };

                if first_seen.is_none() {
                    info!(first_seen = %frame.ts, "First packet");
                    first_seen = Some(frame.ts);
                }
                last_seen = Some(frame.ts);

                match parse_frame(frame.link_type, &frame.data, frame.ts) {
                    Ok(Some(packet)) => reassembler.process(packet, &mut completed),
                    Ok(None) => reassembler.note_ignored(),
                    Err(e) => {
                        debug!(error = %e, ts = %frame.ts, "Skipping malformed frame");
                        reassembler.note_malformed();
                    }
                }

                for record in completed.drain(..) {
                    if let Some(ready) = ordered.push(record) {
                        if !send(&tx, ready, &mut sent, limit).await? {
                            stopped_early = true;
                            return Ok(());
                        }
                    }
                }
            }
            Ok::<(), ReplayError>(())
        }
        .await;

        if let Err(e) = pass {
            drop(tx);
            // The writer's outcome is secondary to the source failure.
            let _ = writer_task.await;
            return Err(e);
        }

        if !limit_reached(sent, limit) {
            reassembler.flush_all(&mut completed);
            for record in completed.drain(..) {
                if let Some(ready) = ordered.push(record) {
                    if !send(&tx, ready, &mut sent, limit).await? {
                        break;
                    }
                }
            }
            while let Some(ready) = ordered.pop() {
                if !send(&tx, ready, &mut sent, limit).await? {
                    break;
                }
            }
        }
        if limit_reached(sent, limit) {
            info!(max_ops = ?limit, "Op limit reached");
            stopped_early = true;
        }
        drop(tx);

        let ops_written = writer_task
            .await
            .map_err(|e| ReplayError::task_failed(format!("log writer: {e}")))??;

        let summary = CaptureSummary {
            source: description,
            stats: *reassembler.stats(),
            ops_written,
            first_seen,
            last_seen,
            elapsed: started.elapsed(),
            stopped_early,
        };

        if summary.stats.decode_errors > 0 || summary.stats.malformed_packets > 0 {
            warn!(
                decode_errors = summary.stats.decode_errors,
                malformed_packets = summary.stats.malformed_packets,
                "Some traffic could not be decoded"
            );
        }
        info!(
            source = %summary.source,
            packets = summary.stats.packets,
            connections = summary.stats.connections_opened,
            ops = summary.ops_written,
            elapsed_ms = summary.elapsed.as_millis(),
            "Capture finished"
        );

        Ok(summary)
    }
}

fn limit_reached(sent: u64, limit: Option<u64>) -> bool {
    limit.is_some_and(|max| sent >= max)
}

/// Forwards one op to the writer; returns `false` once nothing more may be
/// written.
async fn send(
    tx: &mpsc::Sender<OpWithTime>,
    record: OpWithTime,
    sent: &mut u64,
    limit: Option<u64>,
) -> Result<bool> {
    if limit_reached(*sent, limit) {
        return Ok(false);
    }
    tx.send(record)
        .await
        .map_err(|_| ReplayError::task_failed("log writer stopped"))?;
    *sent += 1;
    Ok(!limit_reached(*sent, limit))
}

async fn write_log<W>(mut writer: OpLogWriter<W>, mut rx: mpsc::Receiver<OpWithTime>) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(record) = rx.recv().await {
        writer.append(&record).await?;
    }
    let written = writer.records();
    writer.finish().await?;
    debug!(records = written, "Log writer finished");
    Ok(written)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use bytes::Bytes;
    use wiretape_core::protocol::{encode_op, DeleteOp, MsgHeader, Op, OpCode, RawDocument};
    use wiretape_transport::capture::frame::TcpFlags;
    use wiretape_transport::capture::mock::{tcp_frame, MemorySource};

    use crate::oplog::OpLogReader;

    fn delete(request_id: i32) -> Bytes {
        encode_op(&Op::Delete(DeleteOp {
            header: MsgHeader {
                message_length: 0,
                request_id,
                response_to: 0,
                op_code: OpCode::Delete.as_i32(),
            },
            reserved: 0,
            namespace: "db.c".into(),
            flags: 0,
            selector: RawDocument::empty(),
        }))
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    /// Two connections, each with a SYN and `n` deletes, interleaved in time.
    fn two_connection_capture(n: i32) -> Vec<(CaptureTime, Vec<u8>)> {
        let server = addr("10.0.0.9:27017");
        let clients = [addr("10.0.0.1:40001"), addr("10.0.0.2:40002")];
        let mut frames = Vec::new();
        let mut seqs = [0u32; 2];
        for (i, client) in clients.iter().enumerate() {
            frames.push((
                CaptureTime::from_secs_micros(10, u32::try_from(i).unwrap()),
                tcp_frame(*client, server, 0, TcpFlags::SYN, &[]),
            ));
            seqs[i] = 1;
        }
        for k in 0..n {
            for (i, client) in clients.iter().enumerate() {
                let id = (i32::try_from(i).unwrap() + 1) * 100 + k;
                let wire = delete(id);
                let micros = 1_000 * u32::try_from(k + 1).unwrap() + u32::try_from(i).unwrap();
                frames.push((
                    CaptureTime::from_secs_micros(10, micros),
                    tcp_frame(*client, server, seqs[i], TcpFlags::ACK | TcpFlags::PSH, &wire),
                ));
                seqs[i] += u32::try_from(wire.len()).unwrap();
            }
        }
        frames
    }

    async fn read_back(bytes: Vec<u8>) -> Vec<OpWithTime> {
        let mut reader = OpLogReader::new(bytes.as_slice(), "test");
        let mut out = Vec::new();
        while let Some(r) = reader.next_record().await.unwrap() {
            out.push(r);
        }
        out
    }

    async fn record(config: CaptureConfig, frames: Vec<(CaptureTime, Vec<u8>)>) -> (CaptureSummary, Vec<OpWithTime>) {
        let mut source = MemorySource::ethernet(frames);
        let (tx, rx) = broadcast::channel(1);
        let (client, server) = tokio::io::duplex(1 << 20);
        let reader = tokio::spawn(async move {
            let mut server = server;
            let mut buf = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut server, &mut buf).await.unwrap();
            buf
        });
        let summary = Recorder::new(config)
            .run(&mut source, OpLogWriter::new(client), rx)
            .await
            .unwrap();
        drop(tx);
        let bytes = reader.await.unwrap();
        (summary, read_back(bytes).await)
    }

    #[tokio::test]
    async fn test_records_all_ops_in_time_order() {
        let (summary, ops) = record(CaptureConfig::default(), two_connection_capture(3)).await;
        assert_eq!(summary.ops_written, 6);
        assert_eq!(summary.stats.connections_opened, 2);
        assert!(!summary.stopped_early);

        let ids: Vec<i32> = ops.iter().map(|r| r.op.header().request_id).collect();
        assert_eq!(ids, vec![100, 200, 101, 201, 102, 202]);
        let orders: Vec<u64> = ops.iter().map(|r| r.order).collect();
        assert_eq!(orders, (0..6).collect::<Vec<_>>());
        assert!(ops.windows(2).all(|w| w[0].seen <= w[1].seen));
    }

    #[tokio::test]
    async fn test_max_ops_stops_early() {
        let config = CaptureConfig {
            max_ops: Some(4),
            ..CaptureConfig::default()
        };
        let (summary, ops) = record(config, two_connection_capture(5)).await;
        assert_eq!(summary.ops_written, 4);
        assert_eq!(ops.len(), 4);
        assert!(summary.stopped_early);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_counted() {
        let mut frames = two_connection_capture(1);
        frames.push((CaptureTime::from_secs_micros(11, 0), vec![0u8; 20]));
        let (summary, ops) = record(CaptureConfig::default(), frames).await;
        assert_eq!(ops.len(), 2);
        assert_eq!(
            summary.stats.malformed_packets + summary.stats.ignored_packets,
            1
        );
        assert_eq!(summary.capture_span(), Duration::from_secs(1));
    }
}
