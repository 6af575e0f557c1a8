// ============================================
// File: crates/wiretape-transport/src/live/mock.rs
// ============================================
//! # Mock Live Server
//!
//! ## Creation Reason
//! Stands in for a real database during replay tests: records every
//! message a session sends, with the instant it arrived, and answers
//! queries and get-mores with synthetic replies.
//!
//! ## Usage in Tests
//! ```ignore
//! use wiretape_transport::live::mock::MockDialer;
//!
//! let dialer = MockDialer::new();
//! dialer.refuse(ConnectionId::new(2));
//! // run the player...
//! let sent = dialer.sent();
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - Live cursor ids are handed out from 1000 upward; get-more replies
//!   always report an exhausted cursor
//! - `OP_MSG` requests are answered with an `OP_MSG` body section unless
//!   they set `moreToCome`
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use wiretape_common::ConnectionId;
use wiretape_core::protocol::{
    decode_op, CommandReplyOp, MsgHeader, MsgOp, MsgSection, Op, OpCode, RawDocument, ReplyOp,
};

use crate::error::{Result, TransportError};
use crate::traits::{Dialer, ServerConnection};

/// First cursor id handed out by the mock server.
pub const FIRST_LIVE_CURSOR: i64 = 1000;

// ============================================
// SentMessage
// ============================================

/// A message received by the mock server.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Session that sent it.
    pub connection: ConnectionId,
    /// Decoded op.
    pub op: Op,
    /// Exact bytes written.
    pub raw: Bytes,
    /// When the write happened.
    pub at: Instant,
}

// ============================================
// Shared State
// ============================================

#[derive(Debug)]
struct MockState {
    sent: Vec<SentMessage>,
    refused: HashSet<ConnectionId>,
    failing_sends: HashSet<ConnectionId>,
    stalled_reads: HashSet<ConnectionId>,
    dials: u64,
    next_cursor: i64,
    next_request_id: i32,
    latency: Option<Duration>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            refused: HashSet::new(),
            failing_sends: HashSet::new(),
            stalled_reads: HashSet::new(),
            dials: 0,
            next_cursor: FIRST_LIVE_CURSOR,
            next_request_id: 1,
            latency: None,
        }
    }
}

// ============================================
// MockDialer
// ============================================

/// In-memory `Dialer` whose connections answer like a tiny server.
#[derive(Debug, Clone, Default)]
pub struct MockDialer {
    state: Arc<Mutex<MockState>>,
}

impl MockDialer {
    /// Creates a mock with no failures configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes dials for `connection` fail.
    pub fn refuse(&self, connection: ConnectionId) {
        self.state.lock().refused.insert(connection);
    }

    /// Makes every send on `connection` fail.
    pub fn fail_sends(&self, connection: ConnectionId) {
        self.state.lock().failing_sends.insert(connection);
    }

    /// Makes the next reply read on `connection` time out.
    pub fn stall_next_read(&self, connection: ConnectionId) {
        self.state.lock().stalled_reads.insert(connection);
    }

    /// Delays every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Returns a copy of everything received so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Returns messages received from one session.
    #[must_use]
    pub fn sent_by(&self, connection: ConnectionId) -> Vec<SentMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.connection == connection)
            .cloned()
            .collect()
    }

    /// Number of successful and refused dials.
    #[must_use]
    pub fn dial_count(&self) -> u64 {
        self.state.lock().dials
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, connection: ConnectionId) -> Result<Box<dyn ServerConnection>> {
        let mut state = self.state.lock();
        state.dials += 1;
        if state.refused.contains(&connection) {
            return Err(TransportError::connect_failed("mock", "connection refused"));
        }
        drop(state);
        Ok(Box::new(MockConnection {
            connection,
            state: Arc::clone(&self.state),
            pending: VecDeque::new(),
        }))
    }

    fn target(&self) -> String {
        "mock".into()
    }
}

// ============================================
// MockConnection
// ============================================

struct MockConnection {
    connection: ConnectionId,
    state: Arc<Mutex<MockState>>,
    pending: VecDeque<Op>,
}

impl MockConnection {
    fn mock_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 27017))
    }

    fn reply_for(state: &mut MockState, op: &Op) -> Option<Op> {
        if !op.expects_reply() {
            return None;
        }
        let request_id = state.next_request_id;
        state.next_request_id = state.next_request_id.wrapping_add(1);
        let header = |op_code: OpCode| MsgHeader {
            message_length: 0,
            request_id,
            response_to: op.header().request_id,
            op_code: op_code.as_i32(),
        };

        let cursor_id = match op {
            Op::Query(_) => {
                let id = state.next_cursor;
                state.next_cursor += 1;
                id
            }
            Op::Command(_) => {
                return Some(Op::CommandReply(CommandReplyOp {
                    header: header(OpCode::CommandReply),
                    command_reply: RawDocument::empty(),
                    metadata: RawDocument::empty(),
                    output_docs: Vec::new(),
                }));
            }
            Op::Msg(_) => {
                return Some(Op::Msg(MsgOp {
                    header: header(OpCode::Msg),
                    flag_bits: 0,
                    sections: vec![MsgSection::Body(RawDocument::empty())],
                    checksum: None,
                }));
            }
            _ => 0,
        };
        Some(Op::Reply(ReplyOp {
            header: header(OpCode::Reply),
            flags: 0,
            cursor_id,
            starting_from: 0,
            documents: vec![RawDocument::empty()],
        }))
    }
}

#[async_trait]
impl ServerConnection for MockConnection {
    async fn send(&mut self, message: Bytes) -> Result<()> {
        let at = Instant::now();
        let (op, _) = decode_op(&message)?
            .ok_or_else(|| TransportError::malformed("wire", "incomplete message"))?;

        let mut state = self.state.lock();
        if state.failing_sends.contains(&self.connection) {
            return Err(TransportError::SendFailed {
                dest: Self::mock_addr(),
                reason: "mock send failure".into(),
            });
        }
        if let Some(reply) = Self::reply_for(&mut state, &op) {
            self.pending.push_back(reply);
        }
        state.sent.push(SentMessage {
            connection: self.connection,
            op,
            raw: message,
            at,
        });
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Op> {
        let (latency, stalled) = {
            let mut state = self.state.lock();
            (state.latency, state.stalled_reads.remove(&self.connection))
        };
        if stalled {
            return Err(TransportError::io(
                "reading mock reply",
                io::Error::from(io::ErrorKind::TimedOut),
            ));
        }
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.pending.pop_front().ok_or(TransportError::ConnectionClosed)
    }

    fn peer_addr(&self) -> SocketAddr {
        Self::mock_addr()
    }
}

// ============================================
// Tests
// ============================================
