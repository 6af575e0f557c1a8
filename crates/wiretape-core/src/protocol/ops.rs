// ============================================
// File: crates/wiretape-core/src/protocol/ops.rs
// ============================================
//! # Operation Definitions
//!
//! ## Creation Reason
//! Models every legacy wire-protocol message as one tagged variant so the
//! codec, the reassembler and the playback sessions can switch on the kind
//! exhaustively.
//!
//! ## Main Functionality
//! - `RawDocument`: Opaque, length-prefixed serialized document
//! - One struct per op kind (`QueryOp`, `InsertOp`, ...)
//! - `Op`: Tagged union over all kinds plus `Unknown`
//!
//! ## Body Layouts (after the 16-byte header)
//! | Kind | Layout |
//! |------|--------|
//! | Reply | flags i32, cursorID i64, startingFrom i32, numberReturned i32, documents* |
//! | Update | ZERO i32, ns cstring, flags i32, selector doc, update doc |
//! | Insert | flags i32, ns cstring, documents+ |
//! | Query | flags i32, ns cstring, skip i32, limit i32, query doc, fields doc? |
//! | GetMore | ZERO i32, ns cstring, numberToReturn i32, cursorID i64 |
//! | Delete | ZERO i32, ns cstring, flags i32, selector doc |
//! | KillCursors | ZERO i32, count i32, cursorIDs i64* |
//! | Command | database cstring, commandName cstring, commandArgs doc, metadata doc, inputDocs* |
//! | CommandReply | commandReply doc, metadata doc, outputDocs* |
//! | Msg | flagBits u32, sections+, checksum u32? |
//!
//! `Msg` sections start with a kind byte: 0 is a single body document, 1 is
//! a document sequence (`size i32, identifier cstring, documents*`, where
//! `size` counts itself but not the kind byte).
//!
//! ## ⚠️ Important Note for Next Developer
//! - Documents are NEVER parsed; they are carried as opaque bytes
//! - Reserved ZERO fields are kept as decoded so encoding is byte-exact
//!
//! ## Last Modified
//! v0.1.0 - Initial op definitions

use std::fmt;

use bytes::Bytes;

use crate::protocol::header::{MsgHeader, OpCode};

// ============================================
// RawDocument
// ============================================

/// Serialized document carried verbatim, including its length prefix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawDocument(Bytes);

impl RawDocument {
    /// Smallest valid document: length prefix plus terminator.
    pub const MIN_SIZE: usize = 5;

    /// Wraps bytes whose first four bytes are the document length.
    ///
    /// The codec validates the prefix before calling this.
    #[must_use]
    pub const fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Builds an empty document (`{}`), mostly useful in tests.
    #[must_use]
    pub fn empty() -> Self {
        Self(Bytes::from_static(&[5, 0, 0, 0, 0]))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the encoded size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: a valid document holds at least five bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawDocument({} bytes)", self.0.len())
    }
}

// ============================================
// Per-kind Structures
// ============================================

/// `OP_QUERY`: query a collection or run a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOp {
    /// Message header.
    pub header: MsgHeader,
    /// Query flags bit vector.
    pub flags: i32,
    /// Full collection name (`db.collection`).
    pub namespace: String,
    /// Number of documents to skip.
    pub skip: i32,
    /// Number of documents to return in the first batch.
    pub limit: i32,
    /// Query selector.
    pub query: RawDocument,
    /// Optional field projection.
    pub return_fields: Option<RawDocument>,
}

/// `OP_INSERT`: insert one or more documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOp {
    /// Message header.
    pub header: MsgHeader,
    /// Insert flags bit vector.
    pub flags: i32,
    /// Full collection name.
    pub namespace: String,
    /// Documents to insert.
    pub documents: Vec<RawDocument>,
}

/// `OP_UPDATE`: update matching documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOp {
    /// Message header.
    pub header: MsgHeader,
    /// Reserved field, normally zero.
    pub reserved: i32,
    /// Full collection name.
    pub namespace: String,
    /// Update flags bit vector.
    pub flags: i32,
    /// Document selector.
    pub selector: RawDocument,
    /// Update specification.
    pub update: RawDocument,
}

/// `OP_DELETE`: delete matching documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    /// Message header.
    pub header: MsgHeader,
    /// Reserved field, normally zero.
    pub reserved: i32,
    /// Full collection name.
    pub namespace: String,
    /// Delete flags bit vector.
    pub flags: i32,
    /// Document selector.
    pub selector: RawDocument,
}

/// `OP_GET_MORE`: fetch the next batch of a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMoreOp {
    /// Message header.
    pub header: MsgHeader,
    /// Reserved field, normally zero.
    pub reserved: i32,
    /// Full collection name.
    pub namespace: String,
    /// Number of documents to return.
    pub limit: i32,
    /// Server cursor to continue.
    pub cursor_id: i64,
}

/// `OP_KILL_CURSORS`: close server cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillCursorsOp {
    /// Message header.
    pub header: MsgHeader,
    /// Reserved field, normally zero.
    pub reserved: i32,
    /// Cursors to close.
    pub cursor_ids: Vec<i64>,
}

/// `OP_REPLY`: server response to a query or get-more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOp {
    /// Message header.
    pub header: MsgHeader,
    /// Response flags bit vector.
    pub flags: i32,
    /// Cursor to continue with, 0 when exhausted.
    pub cursor_id: i64,
    /// Position of the first returned document in the cursor.
    pub starting_from: i32,
    /// Returned documents.
    pub documents: Vec<RawDocument>,
}

/// `OP_COMMAND`: run a command against a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOp {
    /// Message header.
    pub header: MsgHeader,
    /// Target database.
    pub database: String,
    /// Command name, e.g. `find`.
    pub command_name: String,
    /// Command arguments.
    pub command_args: RawDocument,
    /// Request metadata.
    pub metadata: RawDocument,
    /// Extra input documents.
    pub input_docs: Vec<RawDocument>,
}

/// `OP_COMMANDREPLY`: server response to an `OP_COMMAND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReplyOp {
    /// Message header.
    pub header: MsgHeader,
    /// Command result.
    pub command_reply: RawDocument,
    /// Reply metadata.
    pub metadata: RawDocument,
    /// Extra output documents.
    pub output_docs: Vec<RawDocument>,
}

/// One section of an `OP_MSG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgSection {
    /// Kind 0: the command or reply document.
    Body(RawDocument),
    /// Kind 1: documents attached to a command argument.
    Sequence {
        /// Argument the documents belong to, e.g. `documents`.
        identifier: String,
        /// The documents.
        documents: Vec<RawDocument>,
    },
}

impl MsgSection {
    /// Kind byte of a body section.
    pub const KIND_BODY: u8 = 0;
    /// Kind byte of a document sequence section.
    pub const KIND_SEQUENCE: u8 = 1;
}

/// `OP_MSG`: the extensible message used for both commands and replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgOp {
    /// Message header.
    pub header: MsgHeader,
    /// Flag bits; see the associated constants.
    pub flag_bits: u32,
    /// Sections in wire order.
    pub sections: Vec<MsgSection>,
    /// CRC-32C of the message, present when `CHECKSUM_PRESENT` is set.
    pub checksum: Option<u32>,
}

impl MsgOp {
    /// A CRC-32C checksum trails the sections.
    pub const CHECKSUM_PRESENT: u32 = 1;
    /// The peer sends another message without waiting for a reply.
    pub const MORE_TO_COME: u32 = 1 << 1;
    /// The client accepts multiple replies to this request.
    pub const EXHAUST_ALLOWED: u32 = 1 << 16;

    /// Returns the body document, if the message has one.
    #[must_use]
    pub fn body(&self) -> Option<&RawDocument> {
        self.sections.iter().find_map(|section| match section {
            MsgSection::Body(doc) => Some(doc),
            MsgSection::Sequence { .. } => None,
        })
    }

    /// Returns `true` if no reply follows this message.
    #[must_use]
    pub const fn more_to_come(&self) -> bool {
        self.flag_bits & Self::MORE_TO_COME != 0
    }

    /// Total number of documents across all sections.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.sections
            .iter()
            .map(|section| match section {
                MsgSection::Body(_) => 1,
                MsgSection::Sequence { documents, .. } => documents.len(),
            })
            .sum()
    }
}

/// Message with an op code the codec does not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOp {
    /// Message header.
    pub header: MsgHeader,
    /// Body bytes after the header.
    pub body: Bytes,
}

// ============================================
// Op
// ============================================

/// A decoded wire-protocol operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `OP_QUERY`
    Query(QueryOp),
    /// `OP_INSERT`
    Insert(InsertOp),
    /// `OP_UPDATE`
    Update(UpdateOp),
    /// `OP_DELETE`
    Delete(DeleteOp),
    /// `OP_GET_MORE`
    GetMore(GetMoreOp),
    /// `OP_KILL_CURSORS`
    KillCursors(KillCursorsOp),
    /// `OP_REPLY`
    Reply(ReplyOp),
    /// `OP_COMMAND`
    Command(CommandOp),
    /// `OP_COMMANDREPLY`
    CommandReply(CommandReplyOp),
    /// `OP_MSG`
    Msg(MsgOp),
    /// Anything else, carried verbatim.
    Unknown(UnknownOp),
}

impl Op {
    /// Returns the message header.
    #[must_use]
    pub const fn header(&self) -> &MsgHeader {
        match self {
            Self::Query(op) => &op.header,
            Self::Insert(op) => &op.header,
            Self::Update(op) => &op.header,
            Self::Delete(op) => &op.header,
            Self::GetMore(op) => &op.header,
            Self::KillCursors(op) => &op.header,
            Self::Reply(op) => &op.header,
            Self::Command(op) => &op.header,
            Self::CommandReply(op) => &op.header,
            Self::Msg(op) => &op.header,
            Self::Unknown(op) => &op.header,
        }
    }

    /// Returns the message header mutably.
    pub fn header_mut(&mut self) -> &mut MsgHeader {
        match self {
            Self::Query(op) => &mut op.header,
            Self::Insert(op) => &mut op.header,
            Self::Update(op) => &mut op.header,
            Self::Delete(op) => &mut op.header,
            Self::GetMore(op) => &mut op.header,
            Self::KillCursors(op) => &mut op.header,
            Self::Reply(op) => &mut op.header,
            Self::Command(op) => &mut op.header,
            Self::CommandReply(op) => &mut op.header,
            Self::Msg(op) => &mut op.header,
            Self::Unknown(op) => &mut op.header,
        }
    }

    /// Returns the op code implied by the variant.
    #[must_use]
    pub const fn op_code(&self) -> OpCode {
        match self {
            Self::Query(_) => OpCode::Query,
            Self::Insert(_) => OpCode::Insert,
            Self::Update(_) => OpCode::Update,
            Self::Delete(_) => OpCode::Delete,
            Self::GetMore(_) => OpCode::GetMore,
            Self::KillCursors(_) => OpCode::KillCursors,
            Self::Reply(_) => OpCode::Reply,
            Self::Command(_) => OpCode::Command,
            Self::CommandReply(_) => OpCode::CommandReply,
            Self::Msg(_) => OpCode::Msg,
            Self::Unknown(op) => OpCode::Unknown(op.header.op_code),
        }
    }

    /// Returns the target namespace, if the kind has one.
    ///
    /// `OP_COMMAND` reports its database. `OP_MSG` names its database
    /// inside the body document, which is never parsed, so it has none.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Query(op) => Some(&op.namespace),
            Self::Insert(op) => Some(&op.namespace),
            Self::Update(op) => Some(&op.namespace),
            Self::Delete(op) => Some(&op.namespace),
            Self::GetMore(op) => Some(&op.namespace),
            Self::Command(op) => Some(&op.database),
            Self::KillCursors(_)
            | Self::Reply(_)
            | Self::CommandReply(_)
            | Self::Msg(_)
            | Self::Unknown(_) => None,
        }
    }

    /// Returns `true` if the server answers this op with a reply.
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        match self {
            Self::Query(_) | Self::GetMore(_) | Self::Command(_) => true,
            Self::Msg(op) => !op.more_to_come() && op.header.response_to == 0,
            _ => false,
        }
    }

    /// Returns `true` for server-to-client messages.
    ///
    /// An `OP_MSG` travels both ways; it is a reply when it answers a request.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        match self {
            Self::Reply(_) | Self::CommandReply(_) => true,
            Self::Msg(op) => op.header.response_to != 0,
            _ => false,
        }
    }

    /// Returns `true` for ops the codec could not decode.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();
        write!(f, "{} #{}", self.op_code(), header.request_id)?;
        match self {
            Self::Query(op) => write!(f, " {} skip={} limit={}", op.namespace, op.skip, op.limit),
            Self::Insert(op) => write!(f, " {} docs={}", op.namespace, op.documents.len()),
            Self::Update(op) => write!(f, " {}", op.namespace),
            Self::Delete(op) => write!(f, " {}", op.namespace),
            Self::GetMore(op) => write!(f, " {} cursor={}", op.namespace, op.cursor_id),
            Self::KillCursors(op) => write!(f, " cursors={:?}", op.cursor_ids),
            Self::Reply(op) => write!(
                f,
                " to=#{} cursor={} returned={}",
                header.response_to,
                op.cursor_id,
                op.documents.len()
            ),
            Self::Command(op) => write!(f, " {} {}", op.database, op.command_name),
            Self::CommandReply(op) => write!(
                f,
                " to=#{} outputs={}",
                header.response_to,
                op.output_docs.len()
            ),
            Self::Msg(op) => {
                if header.response_to != 0 {
                    write!(f, " to=#{}", header.response_to)?;
                }
                write!(f, " flags={:#x} docs={}", op.flag_bits, op.document_count())
            }
            Self::Unknown(op) => write!(f, " body={}B", op.body.len()),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(flag_bits: u32, response_to: i32) -> Op {
        Op::Msg(MsgOp {
            header: MsgHeader {
                message_length: 0,
                request_id: 3,
                response_to,
                op_code: OpCode::Msg.as_i32(),
            },
            flag_bits,
            sections: vec![
                MsgSection::Body(RawDocument::empty()),
                MsgSection::Sequence {
                    identifier: "documents".into(),
                    documents: vec![RawDocument::empty(), RawDocument::empty()],
                },
            ],
            checksum: None,
        })
    }

    #[test]
    fn test_msg_direction_and_reply_expectation() {
        let request = msg(0, 0);
        assert!(request.expects_reply());
        assert!(!request.is_reply());

        let fire_and_forget = msg(MsgOp::MORE_TO_COME, 0);
        assert!(!fire_and_forget.expects_reply());

        let reply = msg(0, 3);
        assert!(reply.is_reply());
        assert!(!reply.expects_reply());
        assert_eq!(reply.namespace(), None);
    }

    #[test]
    fn test_msg_display_counts_documents() {
        let Op::Msg(op) = msg(0, 0) else {
            panic!("expected msg");
        };
        assert_eq!(op.document_count(), 3);
        assert!(op.body().is_some());
        assert_eq!(Op::Msg(op).to_string(), "msg #3 flags=0x0 docs=3");
    }
}
