// ============================================
// File: crates/wiretape-core/src/protocol/header.rs
// ============================================
//! # Message Header & Op Codes
//!
//! ## Creation Reason
//! Every legacy wire-protocol message starts with the same 16-byte header.
//! The reassembler needs to inspect it before a message is complete, so it
//! lives apart from the op bodies.
//!
//! ## Wire Format (Little Endian)
//! ```text
//! ┌────────────────┬────────────────┬────────────────┬────────────────┐
//! │ messageLength  │   requestID    │   responseTo   │     opCode     │
//! │     i32        │     i32        │     i32        │     i32        │
//! └────────────────┴────────────────┴────────────────┴────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `message_length` includes the header itself
//! - Unknown op codes are legal; they decode to `Op::Unknown`
//! - `OP_MSG` (2013) is the only kind modern drivers send; the legacy
//!   kinds are still decoded for older captures
//!
//! ## Last Modified
//! v0.1.0 - Initial header definitions

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

// ============================================
// Constants
// ============================================

/// Size of the standard message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest message the codec accepts by default (48 MiB).
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;

// ============================================
// OpCode
// ============================================

/// Wire-protocol operation code.
///
/// # Values
/// | Value | Kind |
/// |-------|------|
/// | 1 | Reply |
/// | 2001 | Update |
/// | 2002 | Insert |
/// | 2004 | Query |
/// | 2005 | GetMore |
/// | 2006 | Delete |
/// | 2007 | KillCursors |
/// | 2010 | Command |
/// | 2011 | CommandReply |
/// | 2013 | Msg |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    /// Server reply to a query or get-more.
    Reply,
    /// Update documents.
    Update,
    /// Insert documents.
    Insert,
    /// Query a collection (also carries commands).
    Query,
    /// Fetch more results from a cursor.
    GetMore,
    /// Delete documents.
    Delete,
    /// Close server cursors.
    KillCursors,
    /// Run a command against a database (3.2-era command protocol).
    Command,
    /// Server reply to a `Command`.
    CommandReply,
    /// Extensible message carrying commands and replies alike.
    Msg,
    /// Op code this codec does not understand.
    Unknown(i32),
}

impl OpCode {
    /// Converts a raw op code.
    #[must_use]
    pub const fn from_i32(raw: i32) -> Self {
        match raw {
            1 => Self::Reply,
            2001 => Self::Update,
            2002 => Self::Insert,
            2004 => Self::Query,
            2005 => Self::GetMore,
            2006 => Self::Delete,
            2007 => Self::KillCursors,
            2010 => Self::Command,
            2011 => Self::CommandReply,
            2013 => Self::Msg,
            other => Self::Unknown(other),
        }
    }

    /// Returns the raw op code.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Reply => 1,
            Self::Update => 2001,
            Self::Insert => 2002,
            Self::Query => 2004,
            Self::GetMore => 2005,
            Self::Delete => 2006,
            Self::KillCursors => 2007,
            Self::Command => 2010,
            Self::CommandReply => 2011,
            Self::Msg => 2013,
            Self::Unknown(raw) => *raw,
        }
    }

    /// Returns `true` for op codes this codec can decode.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Short lowercase name used in logs and reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Update => "update",
            Self::Insert => "insert",
            Self::Query => "query",
            Self::GetMore => "getmore",
            Self::Delete => "delete",
            Self::KillCursors => "killcursors",
            Self::Command => "command",
            Self::CommandReply => "commandreply",
            Self::Msg => "msg",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
            other => f.write_str(other.name()),
        }
    }
}

// ============================================
// MsgHeader
// ============================================

/// Standard message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgHeader {
    /// Total message length including this header.
    pub message_length: i32,
    /// Identifier assigned by the sender.
    pub request_id: i32,
    /// `request_id` of the message this one answers (0 for requests).
    pub response_to: i32,
    /// Raw op code.
    pub op_code: i32,
}

impl MsgHeader {
    /// Reads a header from the start of `buf` without consuming it.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
    #[must_use]
    pub fn peek(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut cursor = &buf[..HEADER_SIZE];
        Some(Self::read(&mut cursor))
    }

    /// Reads a header, advancing `buf` by [`HEADER_SIZE`] bytes.
    ///
    /// The caller must ensure at least [`HEADER_SIZE`] bytes remain.
    pub fn read(buf: &mut impl Buf) -> Self {
        Self {
            message_length: buf.get_i32_le(),
            request_id: buf.get_i32_le(),
            response_to: buf.get_i32_le(),
            op_code: buf.get_i32_le(),
        }
    }

    /// Writes this header verbatim.
    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.message_length);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.response_to);
        buf.put_i32_le(self.op_code);
    }

    /// Returns the decoded op code.
    #[must_use]
    pub const fn op_code(&self) -> OpCode {
        OpCode::from_i32(self.op_code)
    }

    /// Returns the body length, or `None` if `message_length` is impossible.
    #[must_use]
    pub fn body_len(&self) -> Option<usize> {
        usize::try_from(self.message_length)
            .ok()
            .and_then(|len| len.checked_sub(HEADER_SIZE))
    }

    /// Heuristic check used to resynchronise a stream after lost bytes.
    ///
    /// A plausible header has a sane length and a known op code.
    #[must_use]
    pub fn is_plausible(&self, max_message_size: usize) -> bool {
        let len_ok = usize::try_from(self.message_length)
            .map(|len| (HEADER_SIZE..=max_message_size).contains(&len))
            .unwrap_or(false);
        len_ok && self.op_code().is_known()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_code_roundtrip() {
        for raw in [1, 2001, 2002, 2004, 2005, 2006, 2007, 2010, 2011, 2013, 2012, -1] {
            assert_eq!(OpCode::from_i32(raw).as_i32(), raw);
        }
        assert_eq!(OpCode::from_i32(2013), OpCode::Msg);
        assert_eq!(OpCode::Msg.to_string(), "msg");
        assert!(!OpCode::from_i32(2012).is_known());
        assert_eq!(OpCode::from_i32(2012).to_string(), "unknown(2012)");
    }

    #[test]
    fn test_peek_needs_full_header() {
        assert!(MsgHeader::peek(&[0u8; 15]).is_none());

        let mut buf = Vec::new();
        MsgHeader {
            message_length: 36,
            request_id: 7,
            response_to: 0,
            op_code: 2004,
        }
        .write(&mut buf);
        let header = MsgHeader::peek(&buf).unwrap();
        assert_eq!(header.request_id, 7);
        assert_eq!(header.op_code(), OpCode::Query);
        assert_eq!(header.body_len(), Some(20));
    }

    #[test]
    fn test_plausibility() {
        let mut header = MsgHeader {
            message_length: 40,
            request_id: 1,
            response_to: 0,
            op_code: 2004,
        };
        assert!(header.is_plausible(MAX_MESSAGE_SIZE));

        header.op_code = 9999;
        assert!(!header.is_plausible(MAX_MESSAGE_SIZE));

        header.op_code = 2013;
        assert!(header.is_plausible(MAX_MESSAGE_SIZE));

        header.op_code = 2004;
        header.message_length = 8;
        assert!(!header.is_plausible(MAX_MESSAGE_SIZE));
        assert_eq!(header.body_len(), None);

        header.message_length = -5;
        assert!(!header.is_plausible(MAX_MESSAGE_SIZE));
    }
}
