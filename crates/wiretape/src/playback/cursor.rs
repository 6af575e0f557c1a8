// ============================================
// File: crates/wiretape/src/playback/cursor.rs
// ============================================
//! # Cursor Remapping
//!
//! ## Creation Reason
//! Cursor ids in a recording belong to the captured server. A replayed
//! get-more must carry the id the live server handed out instead.
//!
//! ## Pairing
//! ```text
//! recorded Query  (request_id = R)  ──execute──►  live Reply (cursor = L)
//!                                                     │ pending[R] = L
//! recorded Reply  (response_to = R, cursor = C)  ─────┘
//!                                                     map[C] = L
//! recorded GetMore(cursor = C)      ──rewrite──►  GetMore(cursor = L)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One map per session; cursors are never shared across connections
//! - Ids with no mapping are sent unchanged
//! - Replies on one connection come back in request order, so a recorded
//!   reply to R retires every pending live reply executed before R. The
//!   pending list is also capped at `MAX_PENDING_REPLIES`
//!
//! ## Last Modified
//! v0.1.0 - Initial cursor remapping

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use wiretape_core::protocol::Op;

/// Most live replies kept waiting for their recorded counterpart.
pub const MAX_PENDING_REPLIES: usize = 1024;

/// Recorded-to-live cursor id map for one session.
#[derive(Debug, Default)]
pub struct CursorMap {
    /// `(recorded request id, live cursor)` in execution order.
    pending: VecDeque<(i32, i64)>,
    /// Recorded cursor id -> live cursor id.
    cursors: HashMap<i64, i64>,
}

impl CursorMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers the live cursor returned for a recorded request.
    pub fn record_live_reply(&mut self, recorded_request_id: i32, live_cursor: i64) {
        if self.pending.len() == MAX_PENDING_REPLIES {
            if let Some((request_id, _)) = self.pending.pop_front() {
                debug!(request_id, "Recorded reply never seen, forgetting live reply");
            }
        }
        self.pending.push_back((recorded_request_id, live_cursor));
    }

    /// Pairs a recorded reply with the live reply to the same request.
    ///
    /// Returns the live cursor the recorded cursor now maps to, if any.
    pub fn observe_recorded_reply(&mut self, response_to: i32, recorded_cursor: i64) -> Option<i64> {
        let at = self.pending.iter().position(|(id, _)| *id == response_to)?;
        if at > 0 {
            trace!(stale = at, "Dropping live replies whose recorded reply was not captured");
        }
        let (_, live) = self.pending.drain(..=at).last()?;
        if recorded_cursor == 0 || live == 0 {
            return None;
        }
        trace!(recorded = recorded_cursor, live, "Cursor mapped");
        self.cursors.insert(recorded_cursor, live);
        Some(live)
    }

    /// Live id for a recorded cursor.
    #[must_use]
    pub fn live_cursor(&self, recorded: i64) -> Option<i64> {
        self.cursors.get(&recorded).copied()
    }

    /// Rewrites cursor ids in place; returns the number left unmapped.
    pub fn rewrite(&mut self, op: &mut Op) -> usize {
        let mut unmapped = 0;
        match op {
            Op::GetMore(get_more) => {
                if !self.swap(&mut get_more.cursor_id) {
                    unmapped += 1;
                }
            }
            Op::KillCursors(kill) => {
                for id in &mut kill.cursor_ids {
                    let recorded = *id;
                    if self.swap(id) {
                        self.cursors.remove(&recorded);
                    } else {
                        unmapped += 1;
                    }
                }
            }
            _ => {}
        }
        unmapped
    }

    /// Live replies still waiting for their recorded reply.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    /// Number of mapped cursors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Returns `true` if no cursor is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    fn swap(&self, id: &mut i64) -> bool {
        match self.cursors.get(id) {
            Some(live) => {
                *id = *live;
                true
            }
            None => {
                debug!(cursor = *id, "No live cursor for recorded id, sending unchanged");
                false
            }
        }
    }
}
