// ============================================
// File: crates/wiretape/src/capture/stream_decoder.rs
// ============================================
//! # Per-direction Stream Decoder
//!
//! ## Creation Reason
//! Sits between one reassembled byte stream and the wire codec: buffers
//! partial messages until the codec stops asking for more data, and
//! recovers when bytes were lost.
//!
//! ## Decoder States
//! ```text
//!            ┌──────────── framing error / gap ────────────┐
//!            │                                             ▼
//!   ┌────────────────┐                           ┌──────────────────┐
//!   │  Synchronised  │ ◄── plausible header at ──│  Desynchronised  │
//!   │ (decode loop)  │     a segment boundary    │ (discard bytes)  │
//!   └────────────────┘                           └──────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A malformed body with a sane length is skipped by its declared length;
//!   only an impossible length desynchronises the stream
//! - Resync only recognises the op codes the codec knows (legacy ops,
//!   `OP_COMMAND` and `OP_MSG`), so any other op code after a gap stays
//!   discarded until a known op appears
//!
//! ## Last Modified
//! v0.1.0 - Initial decoder implementation

use bytes::BytesMut;
use tracing::{debug, trace};

use wiretape_core::protocol::{MsgHeader, Op, WireCodec};

use crate::capture::reassembly::ReassemblyStats;

/// A decoded op and whether bytes were lost just before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOp {
    /// The op.
    pub op: Op,
    /// `true` if this is the first op after lost bytes.
    pub gap: bool,
}

/// Incremental decoder for one direction of one connection.
#[derive(Debug)]
pub struct StreamDecoder {
    codec: WireCodec,
    buf: BytesMut,
    synced: bool,
    gap_pending: bool,
}

impl StreamDecoder {
    /// Creates a decoder positioned at a message boundary.
    #[must_use]
    pub fn new(codec: WireCodec) -> Self {
        Self {
            codec,
            buf: BytesMut::new(),
            synced: true,
            gap_pending: false,
        }
    }

    /// Appends a chunk that starts at a segment boundary and decodes
    /// every complete message.
    pub fn feed(&mut self, chunk: &[u8], stats: &mut ReassemblyStats, out: &mut Vec<DecodedOp>) {
        if chunk.is_empty() {
            return;
        }
        if !self.synced {
            let plausible = MsgHeader::peek(chunk)
                .is_some_and(|h| h.is_plausible(self.codec.max_message_size()));
            if !plausible {
                stats.discarded_bytes += chunk.len() as u64;
                return;
            }
            trace!("Stream resynchronised");
            self.synced = true;
        }
        self.buf.extend_from_slice(chunk);
        self.drain(stats, out);
    }

    /// Drops any partial message; decoding resumes at the next plausible
    /// segment boundary.
    pub fn mark_gap(&mut self, stats: &mut ReassemblyStats) {
        self.desync(stats);
    }

    /// Discards a trailing partial message at end of stream.
    pub fn finish(&mut self, stats: &mut ReassemblyStats) {
        if !self.buf.is_empty() {
            trace!(bytes = self.buf.len(), "Discarding partial message at close");
            stats.discarded_bytes += self.buf.len() as u64;
            self.buf.clear();
        }
    }

    /// Bytes buffered towards the next message.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` while the decoder is at a known message boundary.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.synced
    }

    fn drain(&mut self, stats: &mut ReassemblyStats, out: &mut Vec<DecodedOp>) {
        loop {
            match self.codec.check_complete(&self.buf) {
                Ok(Some(len)) => {
                    let frame = self.buf.split_to(len).freeze();
                    match self.codec.decode_frame(frame) {
                        Ok(op) => {
                            stats.ops_decoded += 1;
                            out.push(DecodedOp {
                                op,
                                gap: std::mem::take(&mut self.gap_pending),
                            });
                        }
                        Err(e) => {
                            stats.decode_errors += 1;
                            debug!(error = %e, len, "Skipping malformed message");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    stats.decode_errors += 1;
                    debug!(error = %e, "Lost message framing");
                    self.desync(stats);
                    break;
                }
            }
        }
    }

    fn desync(&mut self, stats: &mut ReassemblyStats) {
        stats.discarded_bytes += self.buf.len() as u64;
        self.buf.clear();
        self.synced = false;
        self.gap_pending = true;
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiretape_core::protocol::{encode_op, DeleteOp, MsgOp, MsgSection, OpCode, RawDocument};

    fn delete(request_id: i32) -> Bytes {
        encode_op(&Op::Delete(DeleteOp {
            header: MsgHeader {
                message_length: 0,
                request_id,
                response_to: 0,
                op_code: OpCode::Delete.as_i32(),
            },
            reserved: 0,
            namespace: "db.c".into(),
            flags: 0,
            selector: RawDocument::empty(),
        }))
    }

    fn msg(request_id: i32) -> Bytes {
        encode_op(&Op::Msg(MsgOp {
            header: MsgHeader {
                message_length: 0,
                request_id,
                response_to: 0,
                op_code: OpCode::Msg.as_i32(),
            },
            flag_bits: 0,
            sections: vec![MsgSection::Body(RawDocument::empty())],
            checksum: None,
        }))
    }

    fn ids(out: &[DecodedOp]) -> Vec<i32> {
        out.iter().map(|d| d.op.header().request_id).collect()
    }

    #[test]
    fn test_partial_then_complete() {
        let mut stats = ReassemblyStats::default();
        let mut dec = StreamDecoder::new(WireCodec::new());
        let wire = delete(1);
        let mut out = Vec::new();

        dec.feed(&wire[..3], &mut stats, &mut out);
        dec.feed(&wire[3..20], &mut stats, &mut out);
        assert!(out.is_empty());
        assert_eq!(dec.buffered(), 20);

        let mut rest = wire[20..].to_vec();
        rest.extend_from_slice(&delete(2));
        dec.feed(&rest, &mut stats, &mut out);
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(stats.ops_decoded, 2);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_gap_resyncs_on_plausible_boundary() {
        let mut stats = ReassemblyStats::default();
        let mut dec = StreamDecoder::new(WireCodec::new());
        let first = delete(1);
        let mut out = Vec::new();

        dec.feed(&first[..10], &mut stats, &mut out);
        dec.mark_gap(&mut stats);
        assert!(!dec.is_synced());
        assert_eq!(stats.discarded_bytes, 10);

        // Mid-message bytes after the gap are not a plausible header.
        dec.feed(&first[20..], &mut stats, &mut out);
        assert!(out.is_empty());

        dec.feed(&delete(2), &mut stats, &mut out);
        dec.feed(&delete(3), &mut stats, &mut out);
        assert_eq!(ids(&out), vec![2, 3]);
        assert!(out[0].gap);
        assert!(!out[1].gap);
    }

    #[test]
    fn test_gap_resyncs_on_msg() {
        let mut stats = ReassemblyStats::default();
        let mut dec = StreamDecoder::new(WireCodec::new());
        let mut out = Vec::new();
        dec.feed(&msg(1)[..8], &mut stats, &mut out);
        dec.mark_gap(&mut stats);

        dec.feed(&msg(2), &mut stats, &mut out);
        assert_eq!(ids(&out), vec![2]);
        assert!(matches!(out[0].op, Op::Msg(_)));
        assert!(out[0].gap);
    }

    #[test]
    fn test_malformed_body_skipped_by_length() {
        let mut stats = ReassemblyStats::default();
        let mut dec = StreamDecoder::new(WireCodec::new());
        let mut bad = delete(1).to_vec();
        // Break the selector's length prefix; the frame length stays intact.
        let doc_at = bad.len() - 5;
        bad[doc_at] = 0x7f;
        bad.extend_from_slice(&delete(2));

        let mut out = Vec::new();
        dec.feed(&bad, &mut stats, &mut out);
        assert_eq!(ids(&out), vec![2]);
        assert_eq!(stats.decode_errors, 1);
        assert!(dec.is_synced());
    }

    #[test]
    fn test_insane_length_desyncs() {
        let mut stats = ReassemblyStats::default();
        let mut dec = StreamDecoder::new(WireCodec::new());
        let mut out = Vec::new();
        dec.feed(&[3, 0, 0, 0, 1, 2, 3, 4], &mut stats, &mut out);
        assert!(!dec.is_synced());
        assert_eq!(stats.decode_errors, 1);

        dec.feed(&delete(5), &mut stats, &mut out);
        assert_eq!(ids(&out), vec![5]);
        assert!(out[0].gap);
    }

    #[test]
    fn test_finish_discards_partial() {
        let mut stats = ReassemblyStats::default();
        let mut dec = StreamDecoder::new(WireCodec::new());
        let mut out = Vec::new();
        dec.feed(&delete(1)[..12], &mut stats, &mut out);
        dec.finish(&mut stats);
        assert_eq!(stats.discarded_bytes, 12);
        assert_eq!(dec.buffered(), 0);
    }
}
