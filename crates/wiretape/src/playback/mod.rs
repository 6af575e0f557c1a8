// ============================================
// File: crates/wiretape/src/playback/mod.rs
// ============================================
//! # Playback
//!
//! ## Creation Reason
//! Replays an operation log against a live server with the recorded
//! per-connection order and timing.
//!
//! ## Main Functionality
//! - [`scheduler`]: `Player`, the read/anchor/route loop
//! - [`session`]: One task and live connection per recorded connection
//! - [`cursor`]: Recorded-to-live cursor id remapping
//! - [`report`]: Per-op JSON-lines stats and run totals
//!
//! ## Last Modified
//! v0.1.0 - Initial playback module

pub mod cursor;
pub mod report;
pub mod scheduler;
pub mod session;

pub use cursor::CursorMap;
pub use report::{OpStat, PlaybackReport, StatReporter, StatSender};
pub use scheduler::{Player, PlayerState};
pub use session::{ScheduledOp, SessionContext, SessionHandle, SessionSummary};
