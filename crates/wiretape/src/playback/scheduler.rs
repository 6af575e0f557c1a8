// ============================================
// File: crates/wiretape/src/playback/scheduler.rs
// ============================================
//! # Playback Scheduler
//!
//! ## Creation Reason
//! Reads an operation log front to back, turns each record's capture
//! time into a wall-clock deadline and routes it to the session of its
//! recorded connection.
//!
//! ## Run States
//! ```text
//! ┌──────┐  run()  ┌───────────┐ first non-zero seen ┌─────────┐
//! │ Idle │ ──────► │ Anchoring │ ──────────────────► │ Running │
//! └──────┘         └───────────┘                     └────┬────┘
//!                                                          │ log exhausted,
//!                                                          │ sessions drained
//!                                                          ▼
//!                                                     ┌─────────┐
//!                                                     │ Drained │
//!                                                     └─────────┘
//! ```
//!
//! ## Timing
//! ```text
//! play_at = playback_start + (seen - recording_start) / speed
//! ```
//! Records with a zero `seen` play immediately. On every repeat pass the
//! recorded times are shifted by the span of the passes before it.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The session map is owned by this loop alone; sessions only see
//!   their own queue
//! - Enqueue blocks when a session queue is full, which stalls the whole
//!   scheduler; that keeps timing faithful at the cost of throughput
//! - Unknown ops are counted and never sent
//!
//! ## Last Modified
//! v0.1.0 - Initial scheduler implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use wiretape_common::{CaptureTime, ConnectionId};
use wiretape_transport::Dialer;

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::oplog::LogSource;
use crate::playback::report::{PlaybackReport, StatReporter, StatSender};
use crate::playback::session::{ScheduledOp, SessionContext, SessionHandle};

// ============================================
// PlayerState
// ============================================

/// Where a playback run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Not started.
    Idle,
    /// Reading records, no timing anchor yet.
    Anchoring,
    /// Anchor fixed, dispatching records.
    Running,
    /// Log exhausted and every session finished.
    Drained,
}

// ============================================
// Anchor
// ============================================

/// Fixed mapping from capture time to wall-clock time.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    recording_start: CaptureTime,
    playback_start: Instant,
    speed: f64,
}

impl Anchor {
    /// Deadline for a record seen at `seen`, or `None` if it lies beyond
    /// what the clock can represent.
    fn play_at(&self, seen: CaptureTime) -> Option<Instant> {
        let recorded = seen.saturating_duration_since(self.recording_start);
        let scaled = Duration::try_from_secs_f64(recorded.as_secs_f64() / self.speed).ok()?;
        self.playback_start.checked_add(scaled)
    }
}

// ============================================
// Player
// ============================================

/// Replays an operation log against a live server.
pub struct Player {
    config: PlaybackConfig,
    dialer: Arc<dyn Dialer>,
    state: PlayerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl Player {
    /// Creates a player.
    #[must_use]
    pub fn new(config: PlaybackConfig, dialer: Arc<dyn Dialer>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            dialer,
            state: PlayerState::Idle,
            shutdown_tx,
        }
    }

    /// Current run state.
    #[must_use]
    pub const fn state(&self) -> PlayerState {
        self.state
    }

    /// Sender that stops a running playback when signalled.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Stops a running playback.
    pub fn shutdown(&self) {
        info!("Initiating playback shutdown");
        let _ = self.shutdown_tx.send(());
    }

    /// Replays `source` `repeat` times and waits for every session to
    /// finish.
    ///
    /// # Errors
    /// Returns error if the log cannot be opened, is corrupt mid-stream, or
    /// the report file cannot be written. Sessions are drained either way.
    pub async fn run(&mut self, source: &LogSource) -> Result<PlaybackReport> {
        let started = Instant::now();
        info!(
            log = %source.describe(),
            target = %self.dialer.target(),
            speed = self.config.speed,
            repeat = self.config.repeat,
            "Playback started"
        );

        let reporter = match self.config.report {
            Some(ref path) => Some(StatReporter::create(path).await?),
            None => None,
        };
        let ctx = SessionContext {
            dialer: Arc::clone(&self.dialer),
            stats: reporter
                .as_ref()
                .map_or_else(StatSender::disabled, StatReporter::sender),
            started,
            shutdown: self.shutdown_tx.clone(),
        };

        let mut sessions = HashMap::new();
        let mut report = PlaybackReport::default();
        self.state = PlayerState::Anchoring;
        let dispatched = self.dispatch(source, &ctx, &mut sessions, &mut report).await;
        drop(ctx);

        let mut handles: Vec<SessionHandle> = sessions.into_values().collect();
        handles.sort_unstable_by_key(SessionHandle::connection);
        debug!(sessions = handles.len(), "Waiting for sessions to drain");
        for handle in handles {
            match handle.finish().await {
                Ok(summary) => {
                    report.ops_executed += summary.executed;
                    report.ops_failed += summary.failed;
                    report.ops_dropped += summary.dropped;
                    report.replies_consumed += summary.replies_consumed;
                    report.connect_failures += u64::from(summary.connect_failed);
                    report.max_lag = report.max_lag.max(summary.max_lag);
                }
                Err(e) => error!(error = %e, "Session ended abnormally"),
            }
        }

        if let Some(reporter) = reporter {
            report.stats_written = reporter.finish().await?;
        }
        self.state = PlayerState::Drained;
        report.elapsed = started.elapsed();
        report.log();

        dispatched?;
        Ok(report)
    }

    /// The single-threaded read, anchor and route loop.
    async fn dispatch(
        &mut self,
        source: &LogSource,
        ctx: &SessionContext,
        sessions: &mut HashMap<ConnectionId, SessionHandle>,
        report: &mut PlaybackReport,
    ) -> Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        let depth = self.config.session_queue_depth;
        let limit = self.config.max_ops;
        let mut anchor: Option<Anchor> = None;
        let mut shift = Duration::ZERO;
        let mut requests: u64 = 0;

        'passes: for pass in 0..self.config.repeat.max(1) {
            let mut reader = source.open().await?;
            report.generations += 1;
            let mut first: Option<CaptureTime> = None;
            let mut last: Option<CaptureTime> = None;
            debug!(pass, shift_ms = shift.as_millis(), "Starting pass over log");

            loop {
                let next = tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Shutdown requested, stopping playback");
                        break 'passes;
                    }
                    next = reader.next_record() => next?,
                };
                let Some(mut record) = next else {
                    break;
                };
                report.ops_read += 1;

                if record.op.is_unknown() {
                    report.ops_skipped += 1;
                    debug!(op = %record.op, order = record.order, "Skipping unknown op");
                    continue;
                }
                let is_request = !record.op.is_reply();
                if is_request && limit.is_some_and(|max| requests >= max) {
                    info!(max_ops = requests, "Op limit reached");
                    break 'passes;
                }

                let play_at = if record.seen.is_zero() {
                    Instant::now()
                } else {
                    first.get_or_insert(record.seen);
                    last = Some(record.seen);
                    record.seen = record.seen + shift;
                    match anchor {
                        Some(ref anchor) => match anchor.play_at(record.seen) {
                            Some(at) => at,
                            None => {
                                report.ops_skipped += 1;
                                warn!(
                                    seen = %record.seen,
                                    order = record.order,
                                    "Op lies too far past the recording start, skipping"
                                );
                                continue;
                            }
                        },
                        None => {
                            let fixed = Anchor {
                                recording_start: record.seen,
                                playback_start: Instant::now(),
                                speed: self.config.speed,
                            };
                            info!(recording_start = %fixed.recording_start, "Playback anchored");
                            self.state = PlayerState::Running;
                            anchor = Some(fixed);
                            fixed.playback_start
                        }
                    }
                };

                let connection = record.connection_id;
                let session = sessions.entry(connection).or_insert_with(|| {
                    report.connections += 1;
                    debug!(%connection, "Creating session");
                    SessionHandle::spawn(connection, depth, ctx.clone())
                });

                let accepted = tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Shutdown requested, stopping playback");
                        break 'passes;
                    }
                    accepted = session.enqueue(ScheduledOp { record, play_at }) => accepted,
                };
                if is_request {
                    requests += 1;
                    if !accepted {
                        warn!(%connection, "Session no longer accepting ops");
                        report.ops_dropped += 1;
                    }
                }
            }

            if let (Some(first), Some(last)) = (first, last) {
                shift += last.saturating_duration_since(first);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("target", &self.dialer.target())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
