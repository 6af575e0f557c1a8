// ============================================
// File: crates/wiretape-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the MongoDB wire protocol, legacy op codes and `OP_MSG`, as
//! observed on captured connections and as re-sent during playback.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`header`]: 16-byte message header and op codes
//! - [`ops`]: Typed op variants with opaque document payloads
//! - [`codec`]: Binary serialization/deserialization
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Client ──── Query #1 (db.c, {x:1}) ──────────────► Server  │
//! │  Client ◄─── Reply #77 (to #1, cursor 42) ───────── Server  │
//! │  Client ──── GetMore #2 (db.c, cursor 42) ────────► Server  │
//! │  Client ◄─── Reply #78 (to #2, cursor 0) ────────── Server  │
//! │  Client ──── Insert #3 (db.c, [doc, doc]) ────────► Server  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format Principles
//! - Little-endian byte order for multi-byte integers
//! - Every message is self-framed by its header length
//! - Documents are length-prefixed and never interpreted here
//!
//! ## ⚠️ Important Note for Next Developer
//! - Request/response linkage fields must round-trip byte-for-byte
//! - Add new op kinds to `OpCode`, `Op` and the codec together
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod header;
pub mod ops;

// Re-export primary types
pub use codec::{decode_op, encode_op, Codec, WireCodec};
pub use header::{MsgHeader, OpCode, HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use ops::{
    CommandOp, CommandReplyOp, DeleteOp, GetMoreOp, InsertOp, KillCursorsOp, MsgOp, MsgSection,
    Op, QueryOp, RawDocument, ReplyOp, UnknownOp, UpdateOp,
};
