// ============================================
// File: crates/wiretape-core/src/lib.rs
// ============================================
//! # Wiretape Core - Wire Protocol & Record Format Library
//!
//! ## Creation Reason
//! Holds the pure, I/O-free parts of the capture/replay pipeline: the wire
//! protocol codec and the operation-log record format. Both the capture
//! path and the playback path depend on these staying byte-exact.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Message header and op code definitions
//! - Typed op variants (query, insert, update, delete, get-more,
//!   kill-cursors, reply, unknown)
//! - Incremental decoding (`Ok(None)` when more bytes are needed)
//! - Byte-exact encoding, optionally with renumbered request ids
//!
//! ### Operation Log Module ([`oplog`])
//! - `OpWithTime`: op + capture time + connection identity
//! - `RecordCodec`: self-delimiting record serialization
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  wiretape (bin)                     │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   wiretape-core  ◄──── wiretape-transport          │
//! │   You are here               │                     │
//! │         │                    │                     │
//! │         └──────────┬─────────┘                     │
//! │                    ▼                               │
//! │            wiretape-common                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Documents are opaque; never parse them here
//! - Any change to encoding must keep `encode(decode(b)) == b`
//! - Record layout changes require a new `RECORD_FORMAT_VERSION`
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod oplog;
pub mod protocol;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use oplog::{OpWithTime, RecordCodec};
pub use protocol::{Codec, MsgHeader, Op, OpCode, WireCodec};
