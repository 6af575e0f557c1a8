// ============================================
// File: crates/wiretape/src/playback/session.rs
// ============================================
//! # Replay Sessions
//!
//! ## Creation Reason
//! Each recorded connection is replayed by its own task over its own live
//! connection, so ops from one connection keep their order while
//! connections run concurrently.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────┐ first request ┌────────────┐  dial ok   ┌───────────┐
//! │ Spawned │ ────────────► │  Dialing   │ ─────────► │ Connected │◄─┐
//! └─────────┘               └─────┬──────┘            └─────┬─────┘  │
//!                                 │ dial failed             │ send / │
//!                                 ▼                         │ reply  │
//!                          ┌────────────┐                   └────────┘
//!                          │ Dropping   │  (drains queue, counts drops)
//!                          └────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A failed op is logged and counted; the session keeps going
//! - A lost connection is re-dialed on the next request; cursors from
//!   the old connection stay mapped and will most likely be rejected
//! - Recorded replies are never sent; legacy replies feed the cursor map
//! - `OP_MSG` cursors live inside opaque documents and are not remapped
//!
//! ## Last Modified
//! v0.1.0 - Initial session implementation

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use wiretape_common::ConnectionId;
use wiretape_core::protocol::{Op, WireCodec};
use wiretape_core::OpWithTime;
use wiretape_transport::{Dialer, ServerConnection, TransportError};

use crate::error::{ReplayError, Result};
use crate::playback::cursor::CursorMap;
use crate::playback::report::{OpStat, StatSender};

// ============================================
// ScheduledOp
// ============================================

/// A recorded op with its replay deadline.
#[derive(Debug, Clone)]
pub struct ScheduledOp {
    /// The recorded op.
    pub record: OpWithTime,
    /// When it should be sent.
    pub play_at: Instant,
}

// ============================================
// SessionContext
// ============================================

/// Shared, read-only inputs for every session of a run.
#[derive(Clone)]
pub struct SessionContext {
    /// Opens live connections.
    pub dialer: Arc<dyn Dialer>,
    /// Execution stats sink.
    pub stats: StatSender,
    /// Start of the run; report offsets are measured from here.
    pub started: Instant,
    /// Run-wide shutdown signal.
    pub shutdown: broadcast::Sender<()>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("target", &self.dialer.target())
            .field("stats", &self.stats.is_enabled())
            .finish_non_exhaustive()
    }
}

// ============================================
// SessionSummary
// ============================================

/// What one session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Recorded connection.
    pub connection: ConnectionId,
    /// Ops sent without error.
    pub executed: u64,
    /// Ops whose send or reply failed.
    pub failed: u64,
    /// Ops never sent (dial failure or shutdown).
    pub dropped: u64,
    /// Recorded replies seen.
    pub replies_consumed: u64,
    /// Live connections opened.
    pub dials: u64,
    /// `true` if the session gave up after a failed dial.
    pub connect_failed: bool,
    /// Worst lag behind schedule.
    pub max_lag: Duration,
}

impl SessionSummary {
    /// Creates an empty summary.
    #[must_use]
    pub const fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            executed: 0,
            failed: 0,
            dropped: 0,
            replies_consumed: 0,
            dials: 0,
            connect_failed: false,
            max_lag: Duration::ZERO,
        }
    }
}

// ============================================
// SessionHandle
// ============================================

/// Scheduler-side handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    connection: ConnectionId,
    tx: mpsc::Sender<ScheduledOp>,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    /// Starts a session task with a queue of `depth` ops.
    #[must_use]
    pub fn spawn(connection: ConnectionId, depth: usize, ctx: SessionContext) -> Self {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let shutdown = ctx.shutdown.subscribe();
        let session = Session {
            connection,
            ctx,
            live: None,
            cursors: CursorMap::new(),
            codec: WireCodec::new(),
            buf: BytesMut::new(),
            next_request_id: 1,
            summary: SessionSummary::new(connection),
        };
        let task = tokio::spawn(session.run(rx, shutdown));
        Self {
            connection,
            tx,
            task,
        }
    }

    /// Recorded connection this session replays.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Queues an op, waiting while the queue is full.
    ///
    /// Returns `false` if the session is no longer accepting ops.
    pub async fn enqueue(&self, op: ScheduledOp) -> bool {
        self.tx.send(op).await.is_ok()
    }

    /// Closes the queue and waits for the session to finish its work.
    ///
    /// # Errors
    /// Returns `TaskFailed` if the session task panicked.
    pub async fn finish(self) -> Result<SessionSummary> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| ReplayError::task_failed(format!("session {}: {e}", self.connection)))
    }
}

// ============================================
// Session Task
// ============================================

enum Outcome {
    Executed(Option<Op>),
    Failed(TransportError),
    Interrupted,
}

struct Session {
    connection: ConnectionId,
    ctx: SessionContext,
    live: Option<Box<dyn ServerConnection>>,
    cursors: CursorMap,
    codec: WireCodec,
    buf: BytesMut,
    next_request_id: i32,
    summary: SessionSummary,
}

impl Session {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<ScheduledOp>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SessionSummary {
        trace!(connection = %self.connection, "Session started");
        let mut stopping = false;

        loop {
            let scheduled = tokio::select! {
                _ = shutdown.recv() => {
                    stopping = true;
                    break;
                }
                next = rx.recv() => match next {
                    Some(scheduled) => scheduled,
                    None => break,
                },
            };

            let ScheduledOp { record, play_at } = scheduled;
            if record.op.is_reply() {
                self.summary.replies_consumed += 1;
                if let Op::Reply(ref reply) = record.op {
                    self.cursors
                        .observe_recorded_reply(reply.header.response_to, reply.cursor_id);
                }
                continue;
            }

            if self.summary.connect_failed {
                self.summary.dropped += 1;
                continue;
            }
            if self.live.is_none() && !self.dial().await {
                self.summary.dropped += 1;
                continue;
            }

            let on_time = tokio::select! {
                _ = shutdown.recv() => false,
                () = tokio::time::sleep_until(play_at) => true,
            };
            if !on_time {
                self.summary.dropped += 1;
                stopping = true;
                break;
            }

            if !self.execute(record, play_at, &mut shutdown).await {
                stopping = true;
                break;
            }
        }

        if stopping {
            rx.close();
            while let Some(scheduled) = rx.recv().await {
                if !scheduled.record.op.is_reply() {
                    self.summary.dropped += 1;
                }
            }
            debug!(
                connection = %self.connection,
                dropped = self.summary.dropped,
                "Session stopped by shutdown"
            );
        }

        trace!(connection = %self.connection, summary = ?self.summary, "Session finished");
        self.summary
    }

    /// Opens the live connection; on failure the session stops sending.
    async fn dial(&mut self) -> bool {
        match self.ctx.dialer.dial(self.connection).await {
            Ok(live) => {
                self.summary.dials += 1;
                debug!(
                    connection = %self.connection,
                    peer = %live.peer_addr(),
                    "Session connected"
                );
                self.live = Some(live);
                true
            }
            Err(e) => {
                error!(
                    connection = %self.connection,
                    target = %self.ctx.dialer.target(),
                    error = %e,
                    "Session could not connect, dropping its ops"
                );
                self.summary.connect_failed = true;
                false
            }
        }
    }

    /// Sends one op; returns `false` if shutdown interrupted it.
    async fn execute(
        &mut self,
        record: OpWithTime,
        play_at: Instant,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let recorded_request_id = record.op.header().request_id;
        let mut op = record.op;
        self.cursors.rewrite(&mut op);

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        self.buf.clear();
        self.codec.encode_renumbered(&op, request_id, 0, &mut self.buf);
        let message = self.buf.split().freeze();

        let played_at = Instant::now();
        let lag = played_at.saturating_duration_since(play_at);
        self.summary.max_lag = self.summary.max_lag.max(lag);

        let outcome = match self.live.as_mut() {
            Some(live) => {
                let expects_reply = op.expects_reply();
                tokio::select! {
                    _ = shutdown.recv() => Outcome::Interrupted,
                    result = exchange(&mut **live, message, expects_reply) => match result {
                        Ok(reply) => Outcome::Executed(reply),
                        Err(e) => Outcome::Failed(e),
                    },
                }
            }
            None => Outcome::Failed(TransportError::ConnectionClosed),
        };
        let latency = played_at.elapsed();

        let mut stat = OpStat {
            order: record.order,
            op: op.op_code().name().to_string(),
            ns: op.namespace().map(str::to_owned),
            connection_num: self.connection.as_u64(),
            play_at_offset_us: offset_us(self.ctx.started, play_at),
            played_at_offset_us: offset_us(self.ctx.started, played_at),
            lag_us: i64::try_from(lag.as_micros()).unwrap_or(i64::MAX),
            latency_us: None,
            num_returned: None,
            cursor_id: None,
            error: None,
        };

        match outcome {
            Outcome::Interrupted => {
                self.summary.dropped += 1;
                return false;
            }
            Outcome::Executed(reply) => {
                self.summary.executed += 1;
                if let Some(reply) = reply {
                    stat.latency_us = Some(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
                    match reply {
                        Op::Reply(reply) => {
                            self.cursors.record_live_reply(recorded_request_id, reply.cursor_id);
                            stat.num_returned = Some(reply.documents.len());
                            stat.cursor_id = Some(reply.cursor_id);
                        }
                        Op::Msg(reply) => stat.num_returned = Some(reply.document_count()),
                        Op::CommandReply(reply) => {
                            stat.num_returned = Some(reply.output_docs.len());
                        }
                        other => {
                            warn!(connection = %self.connection, reply = %other, "Unexpected reply kind");
                        }
                    }
                }
                trace!(connection = %self.connection, op = %op, lag_us = stat.lag_us, "Op executed");
            }
            Outcome::Failed(e) => {
                self.summary.failed += 1;
                warn!(connection = %self.connection, op = %op, error = %e, "Op failed");
                // A timed-out or interrupted exchange leaves the stream mid-message.
                if e.is_connection_error() || e.is_retryable() {
                    info!(connection = %self.connection, "Live connection lost, will re-dial");
                    self.live = None;
                }
                stat.error = Some(e.to_string());
            }
        }

        self.ctx.stats.send(stat).await;
        true
    }
}

async fn exchange(
    live: &mut dyn ServerConnection,
    message: bytes::Bytes,
    expects_reply: bool,
) -> std::result::Result<Option<Op>, TransportError> {
    live.send(message).await?;
    if expects_reply {
        return live.read_reply().await.map(Some);
    }
    Ok(None)
}

fn offset_us(start: Instant, at: Instant) -> i64 {
    if at >= start {
        i64::try_from(at.duration_since(start).as_micros()).unwrap_or(i64::MAX)
    } else {
        -i64::try_from(start.duration_since(at).as_micros()).unwrap_or(i64::MAX)
    }
}

// ============================================
// Tests
// ============================================
