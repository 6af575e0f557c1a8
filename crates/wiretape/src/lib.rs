// ============================================
// File: crates/wiretape/src/lib.rs
// ============================================
//! # Wiretape Library
//!
//! ## Creation Reason
//! Captures MongoDB wire-protocol traffic from packet captures into an
//! operation log, and replays that log against a live server with the
//! original per-connection ordering and timing.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration and CLI overrides
//! - [`capture`]: Reassembly, decoding and the `Recorder`
//!   - [`capture::reassembly`]: Per-connection TCP stream rebuilding
//!   - [`capture::stream_decoder`]: Message framing and resync
//!   - [`capture::ordered`]: Capture-time merge
//! - [`oplog`]: Operation log reader and writer
//! - [`playback`]: `Player`, sessions, cursor remapping, reports
//! - [`error`]: Application error types
//!
//! ## Architecture Overview
//! ```text
//! ┌──────────────────────────── record ─────────────────────────────┐
//! │                                                                 │
//! │  pcap ──► PacketSource ──► Reassembler ──► OrderedOps ──► log   │
//! │                                                                 │
//! ├──────────────────────────── play ───────────────────────────────┤
//! │                                                                 │
//! │  log ──► Player ──┬──► Session(conn-1) ──► live connection      │
//! │                   ├──► Session(conn-2) ──► live connection      │
//! │                   └──► Session(conn-N) ──► live connection      │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Playback timing is best effort; the scheduler never sends early
//! - Sessions never share state, including cursors
//!
//! ## Last Modified
//! v0.1.0 - Initial library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod config;
pub mod error;
pub mod oplog;
pub mod playback;

// Re-export primary types
pub use capture::{CaptureSummary, Recorder};
pub use config::WiretapeConfig;
pub use error::{ReplayError, Result};
pub use oplog::{LogSource, OpLogReader, OpLogWriter};
pub use playback::{PlaybackReport, Player, PlayerState};
