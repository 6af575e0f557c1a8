// ============================================
// File: crates/wiretape-core/src/protocol/codec.rs
// ============================================
//! # Wire Protocol Codec
//!
//! ## Creation Reason
//! Provides the bidirectional mapping between raw wire bytes and typed
//! [`Op`] values, used by the reassembler (decode) and by playback
//! sessions (encode).
//!
//! ## Main Functionality
//! - `Codec` trait: Generic encode/decode interface
//! - `WireCodec`: Implementation for all op kinds
//! - `check_complete`: Incremental framing check (`Ok(None)` = need more data)
//! - Renumbered encoding for replay connections
//! - `OP_MSG` section parsing, including the optional trailing checksum
//!
//! ## Parsing Strategy
//! 1. Read the declared length and check it is sane
//! 2. Wait (`Ok(None)`) until the whole message is buffered
//! 3. Dispatch on op code to a kind-specific parser
//! 4. Reject trailing or missing bytes so encoding stays byte-exact
//!
//! ## ⚠️ Important Note for Next Developer
//! - `encode(decode(bytes)) == bytes` must hold for every accepted message
//! - Always validate buffer lengths before reading
//! - Documents are split off zero-copy from the frame `Bytes`
//! - A renumbered `OP_MSG` drops its checksum: the CRC covers the header,
//!   so the recorded value no longer matches and is not recomputed
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::protocol::header::{MsgHeader, OpCode, HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::protocol::ops::{
    CommandOp, CommandReplyOp, DeleteOp, GetMoreOp, InsertOp, KillCursorsOp, MsgOp, MsgSection,
    Op, QueryOp, RawDocument, ReplyOp, UnknownOp, UpdateOp,
};

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding wire messages.
///
/// # Type Parameters
/// * `T` - The message type to encode/decode
pub trait Codec<T> {
    /// Encodes a message into a byte buffer.
    fn encode(&self, msg: &T, buf: &mut BytesMut);

    /// Decodes one message from the front of `buf`, advancing it.
    ///
    /// # Errors
    /// Returns an error if `buf` does not start with a complete, valid message.
    fn decode(&self, buf: &mut Bytes) -> Result<T>;
}

// ============================================
// WireCodec
// ============================================

/// Codec for legacy wire-protocol messages.
///
/// # Example
/// ```
/// use wiretape_core::protocol::WireCodec;
///
/// let codec = WireCodec::new();
/// // Two bytes are not even a length prefix yet.
/// assert!(codec.try_decode(&[0x24, 0x00]).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct WireCodec {
    max_message_size: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl WireCodec {
    /// Creates a codec with the default 48 MiB message limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Creates a codec with a custom message size limit.
    #[must_use]
    pub const fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Returns the configured message size limit.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Checks if the buffer starts with a complete message.
    ///
    /// # Returns
    /// - `Ok(Some(len))` - Complete message of `len` bytes
    /// - `Ok(None)` - Incomplete message, need more data
    /// - `Err(_)` - Declared length is impossible (framing error)
    ///
    /// # Errors
    /// `InvalidMessageLength` or `MessageTooLarge`.
    pub fn check_complete(&self, buf: &[u8]) -> Result<Option<usize>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let declared = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let len = usize::try_from(declared)
            .ok()
            .filter(|len| *len >= HEADER_SIZE)
            .ok_or(CoreError::InvalidMessageLength {
                declared,
                minimum: HEADER_SIZE,
            })?;
        if len > self.max_message_size {
            return Err(CoreError::MessageTooLarge {
                max: self.max_message_size,
                actual: len,
            });
        }
        if buf.len() < len {
            return Ok(None);
        }
        Ok(Some(len))
    }

    /// Decodes the first message in `buf` if it is complete.
    ///
    /// # Returns
    /// - `Ok(Some((op, consumed)))` - One message decoded from `consumed` bytes
    /// - `Ok(None)` - Need more data
    ///
    /// # Errors
    /// Framing errors from [`check_complete`](Self::check_complete) or body
    /// errors from [`decode_frame`](Self::decode_frame).
    pub fn try_decode(&self, buf: &[u8]) -> Result<Option<(Op, usize)>> {
        match self.check_complete(buf)? {
            Some(len) => {
                let op = self.decode_frame(Bytes::copy_from_slice(&buf[..len]))?;
                Ok(Some((op, len)))
            }
            None => Ok(None),
        }
    }

    /// Decodes exactly one complete message.
    ///
    /// # Errors
    /// Returns a body error if the bytes do not match the op code's layout.
    pub fn decode_frame(&self, frame: Bytes) -> Result<Op> {
        if frame.len() < HEADER_SIZE {
            return Err(CoreError::too_short(HEADER_SIZE, frame.len()));
        }
        let frame_len = frame.len();
        let mut buf = frame;
        let header = MsgHeader::read(&mut buf);
        if header.body_len() != Some(frame_len - HEADER_SIZE) {
            return Err(CoreError::InvalidMessageLength {
                declared: header.message_length,
                minimum: HEADER_SIZE,
            });
        }

        let op = match header.op_code() {
            OpCode::Query => Op::Query(self.decode_query(header, &mut buf)?),
            OpCode::Insert => Op::Insert(self.decode_insert(header, &mut buf)?),
            OpCode::Update => Op::Update(self.decode_update(header, &mut buf)?),
            OpCode::Delete => Op::Delete(self.decode_delete(header, &mut buf)?),
            OpCode::GetMore => Op::GetMore(decode_get_more(header, &mut buf)?),
            OpCode::KillCursors => Op::KillCursors(decode_kill_cursors(header, &mut buf)?),
            OpCode::Reply => Op::Reply(self.decode_reply(header, &mut buf)?),
            OpCode::Command => Op::Command(self.decode_command(header, &mut buf)?),
            OpCode::CommandReply => Op::CommandReply(self.decode_command_reply(header, &mut buf)?),
            OpCode::Msg => Op::Msg(self.decode_msg(header, &mut buf)?),
            OpCode::Unknown(_) => {
                return Ok(Op::Unknown(UnknownOp { header, body: buf }));
            }
        };
        expect_end(&buf, header.op_code().name())?;
        Ok(op)
    }

    /// Encodes `op` with replacement request identifiers.
    ///
    /// Used at replay time so that live requests are numbered in the
    /// replay connection's own identifier space.
    pub fn encode_renumbered(&self, op: &Op, request_id: i32, response_to: i32, buf: &mut BytesMut) {
        let mut header = *op.header();
        header.request_id = request_id;
        header.response_to = response_to;
        match op {
            Op::Msg(msg) if msg.checksum.is_some() => {
                let unsigned = Op::Msg(MsgOp {
                    flag_bits: msg.flag_bits & !MsgOp::CHECKSUM_PRESENT,
                    checksum: None,
                    ..msg.clone()
                });
                encode_with_header(&unsigned, header, buf);
            }
            _ => encode_with_header(op, header, buf),
        }
    }

    // ========================================
    // Kind-specific Decoders
    // ========================================

    fn decode_query(&self, header: MsgHeader, buf: &mut Bytes) -> Result<QueryOp> {
        const OP: &str = "query";
        let flags = read_i32(buf, OP)?;
        let namespace = read_cstring(buf, OP)?;
        let skip = read_i32(buf, OP)?;
        let limit = read_i32(buf, OP)?;
        let query = self.read_document(buf)?;
        let return_fields = if buf.has_remaining() {
            Some(self.read_document(buf)?)
        } else {
            None
        };
        Ok(QueryOp {
            header,
            flags,
            namespace,
            skip,
            limit,
            query,
            return_fields,
        })
    }

    fn decode_insert(&self, header: MsgHeader, buf: &mut Bytes) -> Result<InsertOp> {
        const OP: &str = "insert";
        let flags = read_i32(buf, OP)?;
        let namespace = read_cstring(buf, OP)?;
        let documents = self.read_documents(buf)?;
        Ok(InsertOp {
            header,
            flags,
            namespace,
            documents,
        })
    }

    fn decode_update(&self, header: MsgHeader, buf: &mut Bytes) -> Result<UpdateOp> {
        const OP: &str = "update";
        let reserved = read_i32(buf, OP)?;
        let namespace = read_cstring(buf, OP)?;
        let flags = read_i32(buf, OP)?;
        let selector = self.read_document(buf)?;
        let update = self.read_document(buf)?;
        Ok(UpdateOp {
            header,
            reserved,
            namespace,
            flags,
            selector,
            update,
        })
    }

    fn decode_delete(&self, header: MsgHeader, buf: &mut Bytes) -> Result<DeleteOp> {
        const OP: &str = "delete";
        let reserved = read_i32(buf, OP)?;
        let namespace = read_cstring(buf, OP)?;
        let flags = read_i32(buf, OP)?;
        let selector = self.read_document(buf)?;
        Ok(DeleteOp {
            header,
            reserved,
            namespace,
            flags,
            selector,
        })
    }

    fn decode_reply(&self, header: MsgHeader, buf: &mut Bytes) -> Result<ReplyOp> {
        const OP: &str = "reply";
        let flags = read_i32(buf, OP)?;
        let cursor_id = read_i64(buf, OP)?;
        let starting_from = read_i32(buf, OP)?;
        let number_returned = read_i32(buf, OP)?;
        let documents = self.read_documents(buf)?;
        if usize::try_from(number_returned).ok() != Some(documents.len()) {
            return Err(CoreError::malformed(
                OP,
                format!(
                    "numberReturned is {number_returned} but {} documents follow",
                    documents.len()
                ),
            ));
        }
        Ok(ReplyOp {
            header,
            flags,
            cursor_id,
            starting_from,
            documents,
        })
    }

    fn decode_command(&self, header: MsgHeader, buf: &mut Bytes) -> Result<CommandOp> {
        const OP: &str = "command";
        let database = read_cstring(buf, OP)?;
        let command_name = read_cstring(buf, OP)?;
        let command_args = self.read_document(buf)?;
        let metadata = self.read_document(buf)?;
        let input_docs = self.read_documents(buf)?;
        Ok(CommandOp {
            header,
            database,
            command_name,
            command_args,
            metadata,
            input_docs,
        })
    }

    fn decode_command_reply(&self, header: MsgHeader, buf: &mut Bytes) -> Result<CommandReplyOp> {
        let command_reply = self.read_document(buf)?;
        let metadata = self.read_document(buf)?;
        let output_docs = self.read_documents(buf)?;
        Ok(CommandReplyOp {
            header,
            command_reply,
            metadata,
            output_docs,
        })
    }

    fn decode_msg(&self, header: MsgHeader, buf: &mut Bytes) -> Result<MsgOp> {
        const OP: &str = "msg";
        let flag_bits = read_u32(buf, OP)?;
        let checksum_len = if flag_bits & MsgOp::CHECKSUM_PRESENT == 0 { 0 } else { 4 };
        if buf.remaining() < checksum_len {
            return Err(CoreError::malformed(OP, "missing checksum"));
        }
        let mut sections_buf = buf.split_to(buf.remaining() - checksum_len);

        let mut sections = Vec::new();
        while sections_buf.has_remaining() {
            let kind = sections_buf.get_u8();
            let section = match kind {
                MsgSection::KIND_BODY => MsgSection::Body(self.read_document(&mut sections_buf)?),
                MsgSection::KIND_SEQUENCE => self.read_sequence(&mut sections_buf)?,
                other => {
                    return Err(CoreError::malformed(OP, format!("unknown section kind {other}")));
                }
            };
            sections.push(section);
        }
        if sections.is_empty() {
            return Err(CoreError::malformed(OP, "no sections"));
        }

        let checksum = if checksum_len == 0 {
            None
        } else {
            Some(read_u32(buf, OP)?)
        };
        Ok(MsgOp {
            header,
            flag_bits,
            sections,
            checksum,
        })
    }

    fn read_sequence(&self, buf: &mut Bytes) -> Result<MsgSection> {
        const OP: &str = "msg";
        let size = read_i32(buf, OP)?;
        // The size counts its own four bytes.
        let body_len = usize::try_from(size)
            .ok()
            .and_then(|size| size.checked_sub(4))
            .filter(|len| *len <= buf.remaining())
            .ok_or_else(|| {
                CoreError::malformed(OP, format!("sequence size {size} exceeds {} bytes", buf.remaining() + 4))
            })?;
        let mut section = buf.split_to(body_len);
        let identifier = read_cstring(&mut section, OP)?;
        let documents = self.read_documents(&mut section)?;
        Ok(MsgSection::Sequence {
            identifier,
            documents,
        })
    }

    // ========================================
    // Document Helpers
    // ========================================

    fn read_document(&self, buf: &mut Bytes) -> Result<RawDocument> {
        if buf.remaining() < 4 {
            return Err(CoreError::too_short(4, buf.remaining()));
        }
        let length = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let available = buf.remaining();
        let len = usize::try_from(length)
            .ok()
            .filter(|len| {
                *len >= RawDocument::MIN_SIZE && *len <= available && *len <= self.max_message_size
            })
            .ok_or(CoreError::InvalidDocument { length, available })?;
        Ok(RawDocument::from_bytes(buf.split_to(len)))
    }

    fn read_documents(&self, buf: &mut Bytes) -> Result<Vec<RawDocument>> {
        let mut documents = Vec::new();
        while buf.has_remaining() {
            documents.push(self.read_document(buf)?);
        }
        Ok(documents)
    }
}

// ============================================
// Codec<Op> Implementation
// ============================================

impl Codec<Op> for WireCodec {
    fn encode(&self, msg: &Op, buf: &mut BytesMut) {
        encode_with_header(msg, *msg.header(), buf);
    }

    fn decode(&self, buf: &mut Bytes) -> Result<Op> {
        let len = self
            .check_complete(buf)?
            .ok_or_else(|| CoreError::too_short(frame_hint(buf), buf.len()))?;
        self.decode_frame(buf.split_to(len))
    }
}

// ============================================
// Encoding
// ============================================

fn encode_with_header(op: &Op, mut header: MsgHeader, buf: &mut BytesMut) {
    let start = buf.len();
    header.op_code = op.op_code().as_i32();
    header.write(buf);

    match op {
        Op::Query(q) => {
            buf.put_i32_le(q.flags);
            put_cstring(buf, &q.namespace);
            buf.put_i32_le(q.skip);
            buf.put_i32_le(q.limit);
            buf.put_slice(q.query.as_bytes());
            if let Some(fields) = &q.return_fields {
                buf.put_slice(fields.as_bytes());
            }
        }
        Op::Insert(i) => {
            buf.put_i32_le(i.flags);
            put_cstring(buf, &i.namespace);
            for doc in &i.documents {
                buf.put_slice(doc.as_bytes());
            }
        }
        Op::Update(u) => {
            buf.put_i32_le(u.reserved);
            put_cstring(buf, &u.namespace);
            buf.put_i32_le(u.flags);
            buf.put_slice(u.selector.as_bytes());
            buf.put_slice(u.update.as_bytes());
        }
        Op::Delete(d) => {
            buf.put_i32_le(d.reserved);
            put_cstring(buf, &d.namespace);
            buf.put_i32_le(d.flags);
            buf.put_slice(d.selector.as_bytes());
        }
        Op::GetMore(g) => {
            buf.put_i32_le(g.reserved);
            put_cstring(buf, &g.namespace);
            buf.put_i32_le(g.limit);
            buf.put_i64_le(g.cursor_id);
        }
        Op::KillCursors(k) => {
            buf.put_i32_le(k.reserved);
            buf.put_i32_le(len_i32(k.cursor_ids.len()));
            for id in &k.cursor_ids {
                buf.put_i64_le(*id);
            }
        }
        Op::Reply(r) => {
            buf.put_i32_le(r.flags);
            buf.put_i64_le(r.cursor_id);
            buf.put_i32_le(r.starting_from);
            buf.put_i32_le(len_i32(r.documents.len()));
            for doc in &r.documents {
                buf.put_slice(doc.as_bytes());
            }
        }
        Op::Command(c) => {
            put_cstring(buf, &c.database);
            put_cstring(buf, &c.command_name);
            buf.put_slice(c.command_args.as_bytes());
            buf.put_slice(c.metadata.as_bytes());
            for doc in &c.input_docs {
                buf.put_slice(doc.as_bytes());
            }
        }
        Op::CommandReply(r) => {
            buf.put_slice(r.command_reply.as_bytes());
            buf.put_slice(r.metadata.as_bytes());
            for doc in &r.output_docs {
                buf.put_slice(doc.as_bytes());
            }
        }
        Op::Msg(m) => {
            buf.put_u32_le(m.flag_bits);
            for section in &m.sections {
                put_section(buf, section);
            }
            if let Some(checksum) = m.checksum {
                buf.put_u32_le(checksum);
            }
        }
        Op::Unknown(u) => buf.put_slice(&u.body),
    }

    // Patch the length now that the body size is known.
    let total = len_i32(buf.len() - start);
    buf[start..start + 4].copy_from_slice(&total.to_le_bytes());
}

fn put_section(buf: &mut BytesMut, section: &MsgSection) {
    match section {
        MsgSection::Body(doc) => {
            buf.put_u8(MsgSection::KIND_BODY);
            buf.put_slice(doc.as_bytes());
        }
        MsgSection::Sequence {
            identifier,
            documents,
        } => {
            buf.put_u8(MsgSection::KIND_SEQUENCE);
            let size = 4
                + identifier.len()
                + 1
                + documents.iter().map(RawDocument::len).sum::<usize>();
            buf.put_i32_le(len_i32(size));
            put_cstring(buf, identifier);
            for doc in documents {
                buf.put_slice(doc.as_bytes());
            }
        }
    }
}

fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn len_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

// ============================================
// Primitive Readers
// ============================================

fn read_i32(buf: &mut Bytes, op: &'static str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(CoreError::malformed(op, "truncated int32 field"));
    }
    Ok(buf.get_i32_le())
}

fn read_u32(buf: &mut Bytes, op: &'static str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(CoreError::malformed(op, "truncated uint32 field"));
    }
    Ok(buf.get_u32_le())
}

fn read_i64(buf: &mut Bytes, op: &'static str) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(CoreError::malformed(op, "truncated int64 field"));
    }
    Ok(buf.get_i64_le())
}

fn read_cstring(buf: &mut Bytes, op: &'static str) -> Result<String> {
    let nul = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| CoreError::malformed(op, "unterminated namespace"))?;
    let raw = buf.split_to(nul);
    buf.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|_| CoreError::malformed(op, "namespace is not UTF-8"))
}

fn expect_end(buf: &Bytes, op: &'static str) -> Result<()> {
    if buf.has_remaining() {
        return Err(CoreError::malformed(
            op,
            format!("{} trailing bytes", buf.remaining()),
        ));
    }
    Ok(())
}

fn frame_hint(buf: &[u8]) -> usize {
    MsgHeader::peek(buf)
        .and_then(|h| usize::try_from(h.message_length).ok())
        .unwrap_or(HEADER_SIZE)
}

// ============================================
// GetMore / KillCursors (no documents)
// ============================================

fn decode_get_more(header: MsgHeader, buf: &mut Bytes) -> Result<GetMoreOp> {
    const OP: &str = "getmore";
    let reserved = read_i32(buf, OP)?;
    let namespace = read_cstring(buf, OP)?;
    let limit = read_i32(buf, OP)?;
    let cursor_id = read_i64(buf, OP)?;
    Ok(GetMoreOp {
        header,
        reserved,
        namespace,
        limit,
        cursor_id,
    })
}

fn decode_kill_cursors(header: MsgHeader, buf: &mut Bytes) -> Result<KillCursorsOp> {
    const OP: &str = "killcursors";
    let reserved = read_i32(buf, OP)?;
    let count = read_i32(buf, OP)?;
    let count = usize::try_from(count)
        .map_err(|_| CoreError::malformed(OP, format!("negative cursor count {count}")))?;
    if buf.remaining() != count * 8 {
        return Err(CoreError::malformed(
            OP,
            format!("{count} cursors declared, {} bytes follow", buf.remaining()),
        ));
    }
    let cursor_ids = (0..count).map(|_| buf.get_i64_le()).collect();
    Ok(KillCursorsOp {
        header,
        reserved,
        cursor_ids,
    })
}

// ============================================
// Convenience Functions
// ============================================

/// Decodes the first message of `buf` with the default codec.
///
/// # Errors
/// See [`WireCodec::try_decode`].
pub fn decode_op(buf: &[u8]) -> Result<Option<(Op, usize)>> {
    WireCodec::new().try_decode(buf)
}

/// Encodes an op with the default codec.
#[must_use]
pub fn encode_op(op: &Op) -> Bytes {
    let mut buf = BytesMut::new();
    WireCodec::new().encode(op, &mut buf);
    buf.freeze()
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a document `{x: n}` by hand.
    pub(crate) fn doc_x(n: i32) -> Vec<u8> {
        let mut d = vec![12, 0, 0, 0, 0x10, b'x', 0];
        d.extend_from_slice(&n.to_le_bytes());
        d.push(0);
        d
    }

    /// Frames a body with a header.
    pub(crate) fn frame(request_id: i32, response_to: i32, op_code: i32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((HEADER_SIZE + body.len()) as i32).to_le_bytes());
        out.extend_from_slice(&request_id.to_le_bytes());
        out.extend_from_slice(&response_to.to_le_bytes());
        out.extend_from_slice(&op_code.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    pub(crate) fn query_bytes(request_id: i32, ns: &str, with_fields: bool) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&4i32.to_le_bytes());
        body.extend_from_slice(ns.as_bytes());
        body.push(0);
        body.extend_from_slice(&10i32.to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&doc_x(1));
        if with_fields {
            body.extend_from_slice(&doc_x(0));
        }
        frame(request_id, 0, 2004, &body)
    }

    pub(crate) fn reply_bytes(request_id: i32, response_to: i32, cursor_id: i64, docs: usize) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&8i32.to_le_bytes());
        body.extend_from_slice(&cursor_id.to_le_bytes());
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(&(docs as i32).to_le_bytes());
        for n in 0..docs {
            body.extend_from_slice(&doc_x(n as i32));
        }
        frame(request_id, response_to, 1, &body)
    }

    pub(crate) fn get_more_bytes(request_id: i32, ns: &str, cursor_id: i64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(ns.as_bytes());
        body.push(0);
        body.extend_from_slice(&100i32.to_le_bytes());
        body.extend_from_slice(&cursor_id.to_le_bytes());
        frame(request_id, 0, 2005, &body)
    }

    fn insert_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&1i32.to_le_bytes());
        body.extend_from_slice(b"db.c\0");
        body.extend_from_slice(&doc_x(1));
        body.extend_from_slice(&doc_x(2));
        frame(11, 0, 2002, &body)
    }

    fn update_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(b"db.c\0");
        body.extend_from_slice(&2i32.to_le_bytes());
        body.extend_from_slice(&doc_x(1));
        body.extend_from_slice(&doc_x(5));
        frame(12, 0, 2001, &body)
    }

    fn delete_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(b"db.c\0");
        body.extend_from_slice(&1i32.to_le_bytes());
        body.extend_from_slice(&doc_x(9));
        frame(13, 0, 2006, &body)
    }

    fn kill_cursors_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(&2i32.to_le_bytes());
        body.extend_from_slice(&42i64.to_le_bytes());
        body.extend_from_slice(&43i64.to_le_bytes());
        frame(14, 0, 2007, &body)
    }

    pub(crate) fn msg_bytes(request_id: i32, flag_bits: u32, checksum: Option<u32>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&flag_bits.to_le_bytes());
        body.push(0);
        body.extend_from_slice(&doc_x(1));
        let mut sequence = Vec::new();
        sequence.extend_from_slice(b"documents\0");
        sequence.extend_from_slice(&doc_x(2));
        sequence.extend_from_slice(&doc_x(3));
        body.push(1);
        body.extend_from_slice(&((sequence.len() + 4) as i32).to_le_bytes());
        body.extend_from_slice(&sequence);
        if let Some(checksum) = checksum {
            body.extend_from_slice(&checksum.to_le_bytes());
        }
        frame(request_id, 0, 2013, &body)
    }

    fn command_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"admin\0isMaster\0");
        body.extend_from_slice(&doc_x(1));
        body.extend_from_slice(&doc_x(0));
        frame(15, 0, 2010, &body)
    }

    fn command_reply_bytes() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&doc_x(1));
        body.extend_from_slice(&doc_x(0));
        body.extend_from_slice(&doc_x(7));
        frame(16, 15, 2011, &body)
    }

    fn roundtrip(bytes: &[u8]) -> Op {
        let (op, consumed) = decode_op(bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(encode_op(&op).as_ref(), bytes, "re-encoding {op} changed bytes");
        op
    }

    #[test]
    fn test_roundtrip_every_kind() {
        assert!(matches!(roundtrip(&query_bytes(1, "db.c", false)), Op::Query(_)));
        assert!(matches!(roundtrip(&query_bytes(1, "db.c", true)), Op::Query(_)));
        assert!(matches!(roundtrip(&insert_bytes()), Op::Insert(_)));
        assert!(matches!(roundtrip(&update_bytes()), Op::Update(_)));
        assert!(matches!(roundtrip(&delete_bytes()), Op::Delete(_)));
        assert!(matches!(roundtrip(&get_more_bytes(3, "db.c", 42)), Op::GetMore(_)));
        assert!(matches!(roundtrip(&kill_cursors_bytes()), Op::KillCursors(_)));
        assert!(matches!(roundtrip(&reply_bytes(2, 1, 42, 3)), Op::Reply(_)));
        assert!(matches!(roundtrip(&command_bytes()), Op::Command(_)));
        assert!(matches!(roundtrip(&command_reply_bytes()), Op::CommandReply(_)));
        assert!(matches!(roundtrip(&msg_bytes(4, 0, None)), Op::Msg(_)));
        assert!(matches!(roundtrip(&msg_bytes(4, 1, Some(0xdead_beef))), Op::Msg(_)));
        assert!(matches!(roundtrip(&frame(5, 0, 2012, b"opaque")), Op::Unknown(_)));
    }

    #[test]
    fn test_msg_sections() {
        let Op::Msg(msg) = roundtrip(&msg_bytes(21, MsgOp::CHECKSUM_PRESENT, Some(7))) else {
            panic!("expected msg");
        };
        assert_eq!(msg.checksum, Some(7));
        assert_eq!(msg.body().map(RawDocument::as_bytes), Some(doc_x(1).as_slice()));
        let MsgSection::Sequence { identifier, documents } = &msg.sections[1] else {
            panic!("expected document sequence");
        };
        assert_eq!(identifier, "documents");
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].as_bytes(), doc_x(3).as_slice());
    }

    #[test]
    fn test_malformed_msg_sections() {
        // Unknown section kind.
        let mut bad_kind = msg_bytes(1, 0, None);
        bad_kind[HEADER_SIZE + 4] = 7;
        assert!(decode_op(&bad_kind).unwrap_err().is_protocol_error());

        // Sequence size running past the message.
        let mut long_seq = msg_bytes(1, 0, None);
        let size_at = HEADER_SIZE + 4 + 1 + 12 + 1;
        long_seq[size_at] = 200;
        assert!(decode_op(&long_seq).is_err());

        // Checksum flag without a checksum leaves the last four bytes to the
        // checksum, cutting the final document short.
        let mut no_sum = msg_bytes(1, 0, None);
        no_sum[HEADER_SIZE] = 1;
        assert!(decode_op(&no_sum).is_err());

        // Flag bits only.
        assert!(decode_op(&frame(1, 0, 2013, &[0, 0, 0, 0])).is_err());
    }

    #[test]
    fn test_renumbered_msg_drops_checksum() {
        let bytes = msg_bytes(3, MsgOp::CHECKSUM_PRESENT | MsgOp::EXHAUST_ALLOWED, Some(99));
        let (op, _) = decode_op(&bytes).unwrap().unwrap();

        let mut buf = BytesMut::new();
        WireCodec::new().encode_renumbered(&op, 900, 0, &mut buf);
        let (renumbered, used) = decode_op(&buf).unwrap().unwrap();
        assert_eq!(used, bytes.len() - 4);
        let Op::Msg(msg) = renumbered else {
            panic!("expected msg");
        };
        assert_eq!(msg.header.request_id, 900);
        assert_eq!(msg.flag_bits, MsgOp::EXHAUST_ALLOWED);
        assert_eq!(msg.checksum, None);
        assert_eq!(msg.document_count(), 3);
    }

    #[test]
    fn test_query_fields() {
        let op = roundtrip(&query_bytes(77, "test.users", true));
        let Op::Query(q) = op else {
            panic!("expected query");
        };
        assert_eq!(q.header.request_id, 77);
        assert_eq!(q.namespace, "test.users");
        assert_eq!(q.skip, 10);
        assert_eq!(q.limit, -1);
        assert_eq!(q.query.as_bytes(), doc_x(1).as_slice());
        assert!(q.return_fields.is_some());
    }

    #[test]
    fn test_need_more_data() {
        let bytes = query_bytes(1, "db.c", false);
        let codec = WireCodec::new();
        for cut in [0, 3, 4, HEADER_SIZE, bytes.len() - 1] {
            assert!(codec.try_decode(&bytes[..cut]).unwrap().is_none(), "cut at {cut}");
        }
        assert!(codec.try_decode(&bytes).unwrap().is_some());
    }

    #[test]
    fn test_decode_consumes_only_first_message() {
        let mut bytes = query_bytes(1, "db.c", false);
        let first_len = bytes.len();
        bytes.extend_from_slice(&get_more_bytes(2, "db.c", 1));
        let (_, consumed) = decode_op(&bytes).unwrap().unwrap();
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_unknown_op_code_is_not_an_error() {
        let bytes = frame(9, 0, 2012, &[1, 2, 3, 4]);
        let (op, _) = decode_op(&bytes).unwrap().unwrap();
        let Op::Unknown(u) = op else {
            panic!("expected unknown");
        };
        assert_eq!(u.header.op_code, 2012);
        assert_eq!(u.body.as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_framing_errors() {
        let codec = WireCodec::with_max_message_size(64);
        let mut tiny = frame(1, 0, 2004, &[]);
        tiny[0] = 8;
        assert!(codec.try_decode(&tiny).unwrap_err().is_framing_error());

        let big = frame(1, 0, 2004, &[0u8; 100]);
        assert!(codec.try_decode(&big).unwrap_err().is_framing_error());
    }

    #[test]
    fn test_body_errors_are_not_framing_errors() {
        // Namespace without terminator.
        let bad = frame(1, 0, 2004, &[0, 0, 0, 0, b'd', b'b']);
        let err = decode_op(&bad).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(!err.is_framing_error());

        // Reply whose count disagrees with its documents.
        let mut reply = reply_bytes(1, 1, 0, 1);
        reply[HEADER_SIZE + 16] = 2;
        assert!(decode_op(&reply).is_err());

        // Document length running past the frame.
        let mut del = delete_bytes();
        let doc_start = del.len() - 12;
        del[doc_start] = 200;
        assert!(matches!(decode_op(&del), Err(CoreError::InvalidDocument { .. })));
    }

    #[test]
    fn test_cursor_linkage() {
        let mut stream = query_bytes(1, "db.c", false);
        stream.extend_from_slice(&reply_bytes(100, 1, 42, 2));
        stream.extend_from_slice(&get_more_bytes(2, "db.c", 42));

        let mut ops = Vec::new();
        let mut rest = stream.as_slice();
        while let Some((op, used)) = decode_op(rest).unwrap() {
            ops.push(op);
            rest = &rest[used..];
        }
        assert!(rest.is_empty());
        assert_eq!(ops.len(), 3);

        let Op::Reply(reply) = &ops[1] else {
            panic!("expected reply");
        };
        let Op::GetMore(get_more) = &ops[2] else {
            panic!("expected getmore");
        };
        assert_eq!(reply.header.response_to, ops[0].header().request_id);
        assert_eq!(get_more.cursor_id, reply.cursor_id);
        assert_eq!(get_more.cursor_id, 42);
    }

    #[test]
    fn test_renumbered_encoding() {
        let bytes = get_more_bytes(3, "db.c", 42);
        let (op, _) = decode_op(&bytes).unwrap().unwrap();

        let mut buf = BytesMut::new();
        WireCodec::new().encode_renumbered(&op, 900, 0, &mut buf);
        let header = MsgHeader::peek(&buf).unwrap();
        assert_eq!(header.request_id, 900);
        assert_eq!(header.message_length as usize, bytes.len());
        assert_eq!(&buf[8..], &bytes[8..]);
    }

    #[test]
    fn test_encode_recomputes_length() {
        let (op, _) = decode_op(&insert_bytes()).unwrap().unwrap();
        let Op::Insert(mut insert) = op else {
            panic!("expected insert");
        };
        insert.documents.push(RawDocument::empty());
        let encoded = encode_op(&Op::Insert(insert));
        let header = MsgHeader::peek(&encoded).unwrap();
        assert_eq!(header.message_length as usize, encoded.len());
        assert!(decode_op(&encoded).unwrap().is_some());
    }

    #[test]
    fn test_codec_trait_decode_advances() {
        let mut stream = query_bytes(1, "db.c", false);
        stream.extend_from_slice(&get_more_bytes(2, "db.c", 5));
        let mut buf = Bytes::from(stream);
        let codec = WireCodec::new();
        assert!(matches!(codec.decode(&mut buf).unwrap(), Op::Query(_)));
        assert!(matches!(codec.decode(&mut buf).unwrap(), Op::GetMore(_)));
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).is_err());
    }
}
