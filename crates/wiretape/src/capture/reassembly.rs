// ============================================
// File: crates/wiretape/src/capture/reassembly.rs
// ============================================
//! # Stream Reassembler
//!
//! ## Creation Reason
//! Turns captured TCP segments, in arrival order and possibly out of
//! sequence order, into one ordered byte stream per connection direction,
//! and hands each stream to its own wire decoder.
//!
//! ## Main Functionality
//! - `ReassemblyBuffer`: Per-direction pending segments + contiguity cursor
//! - `Reassembler`: Connection table, FIN/RST/idle finalization
//! - `ReassemblyStats`: Counters reported at the end of a capture
//!
//! ## Buffer Model
//! ```text
//!            next_offset
//!                 │
//!   delivered     ▼      pending (BTreeMap by offset)
//! ───────────────┤ ┌────┐   ┌────┐ ┌──────┐
//!                │ │hole│   │ s3 │ │  s4  │ ...
//! ───────────────┤ └────┘   └────┘ └──────┘
//!
//! contiguous head ──► Chunk::Data ──► StreamDecoder
//! pending > packet_buf_size ──► skip hole ──► Chunk::Gap
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Sequence arithmetic is modulo 2^32; offsets are 64-bit stream positions
//!   computed relative to the cursor, so a stream may wrap `seq` freely
//! - A direction without an observed SYN holds its segments unanchored
//!   until FIN, overflow or close, then starts at the lowest sequence held
//! - Bytes arriving below the stream start after that are counted as late
//! - Idle expiry is driven by capture timestamps, never the wall clock
//!
//! ## Last Modified
//! v0.1.0 - Initial reassembly implementation

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use wiretape_common::{CaptureTime, ConnectionId, ConnectionKey, FlowKey};
use wiretape_core::protocol::WireCodec;
use wiretape_core::OpWithTime;
use wiretape_transport::Packet;

use crate::capture::stream_decoder::{DecodedOp, StreamDecoder};
use crate::config::{CaptureConfig, OverflowPolicy};

/// Upper bound on the interval between idle sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// ============================================
// ReassemblyStats
// ============================================

/// Counters accumulated over one capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// TCP packets handed to the reassembler.
    pub packets: u64,
    /// Payload bytes in those packets.
    pub payload_bytes: u64,
    /// Frames whose headers could not be parsed.
    pub malformed_packets: u64,
    /// Frames that carried no TCP or belonged to no connection.
    pub ignored_packets: u64,
    /// Connections created.
    pub connections_opened: u64,
    /// Connections finalized.
    pub connections_closed: u64,
    /// Forced skips over missing data.
    pub gaps: u64,
    /// Bytes skipped by those gaps.
    pub gap_bytes: u64,
    /// Retransmitted or overlapping bytes trimmed.
    pub duplicate_bytes: u64,
    /// Bytes that arrived below the stream start once it was fixed.
    pub late_bytes: u64,
    /// Segments discarded under `OverflowPolicy::DropNewest`.
    pub dropped_segments: u64,
    /// Ops decoded.
    pub ops_decoded: u64,
    /// Messages that failed to decode.
    pub decode_errors: u64,
    /// Stream bytes thrown away while desynchronised or at close.
    pub discarded_bytes: u64,
}

// ============================================
// ReassemblyBuffer
// ============================================

/// Output of a reassembly step, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Next contiguous bytes of the stream. Starts at a segment boundary.
    Data {
        /// The bytes.
        bytes: Bytes,
        /// Capture time of the segment that carried them.
        seen: CaptureTime,
    },
    /// This many bytes were never seen and have been skipped.
    Gap(u64),
}

#[derive(Debug, Clone)]
struct Segment {
    data: Bytes,
    seen: CaptureTime,
}

/// One direction's pending segments.
///
/// Until the stream start is known (a SYN, or the lowest sequence held
/// when the direction is forced to deliver) segments wait unanchored.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    /// Sequence number of the byte at `next_offset`; `None` until anchored.
    next_seq: Option<u32>,
    next_offset: u64,
    pending: BTreeMap<u64, Segment>,
    unanchored: Vec<(u32, Segment)>,
    capacity: usize,
    policy: OverflowPolicy,
    gapped: bool,
}

impl ReassemblyBuffer {
    /// Creates a buffer holding at most `capacity` out-of-order segments.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            next_seq: None,
            next_offset: 0,
            pending: BTreeMap::new(),
            unanchored: Vec::new(),
            capacity: capacity.max(1),
            policy,
            gapped: false,
        }
    }

    /// Inserts one segment and appends whatever became contiguous to `out`.
    pub fn push(
        &mut self,
        seq: u32,
        syn: bool,
        payload: Bytes,
        seen: CaptureTime,
        out: &mut Vec<Chunk>,
        stats: &mut ReassemblyStats,
    ) {
        // SYN occupies one sequence number before the first data byte.
        let data_seq = if syn { seq.wrapping_add(1) } else { seq };
        if syn && self.next_seq.is_none() {
            self.anchor(data_seq, out, stats);
        }
        if payload.is_empty() {
            return;
        }

        let segment = Segment {
            data: payload,
            seen,
        };
        if self.next_seq.is_none() {
            self.unanchored.push((data_seq, segment));
            if self.unanchored.len() > self.capacity {
                self.anchor_at_lowest(out, stats);
            }
            return;
        }
        self.insert(data_seq, segment, out, stats);
    }

    /// Fixes the stream start at the lowest sequence held, if the
    /// direction is still unanchored, and delivers what became contiguous.
    pub fn anchor_at_lowest(&mut self, out: &mut Vec<Chunk>, stats: &mut ReassemblyStats) {
        if self.next_seq.is_some() {
            return;
        }
        let Some(&(reference, _)) = self.unanchored.first() else {
            return;
        };
        let lowest = self
            .unanchored
            .iter()
            .map(|(seq, _)| *seq)
            .min_by_key(|seq| seq.wrapping_sub(reference) as i32)
            .unwrap_or(reference);
        trace!(seq = lowest, held = self.unanchored.len(), "Anchoring stream without SYN");
        self.anchor(lowest, out, stats);
    }

    /// Delivers everything still pending, skipping over holes.
    pub fn flush(&mut self, out: &mut Vec<Chunk>, stats: &mut ReassemblyStats) {
        self.anchor_at_lowest(out, stats);
        self.pop_contiguous(out, stats);
        while !self.pending.is_empty() {
            self.skip_to_pending(out, stats);
            self.pop_contiguous(out, stats);
        }
    }

    /// Number of segments held, anchored or not.
    #[must_use]
    pub fn pending_segments(&self) -> usize {
        self.pending.len() + self.unanchored.len()
    }

    /// Returns `true` once the stream start is known.
    #[must_use]
    pub const fn is_anchored(&self) -> bool {
        self.next_seq.is_some()
    }

    /// Stream position of the next expected byte.
    #[must_use]
    pub const fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Returns `true` once any bytes of this direction have been skipped.
    #[must_use]
    pub const fn has_gap(&self) -> bool {
        self.gapped
    }

    fn anchor(&mut self, seq: u32, out: &mut Vec<Chunk>, stats: &mut ReassemblyStats) {
        self.next_seq = Some(seq);
        for (seq, segment) in std::mem::take(&mut self.unanchored) {
            self.insert(seq, segment, out, stats);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn insert(&mut self, seq: u32, segment: Segment, out: &mut Vec<Chunk>, stats: &mut ReassemblyStats) {
        let Some(next_seq) = self.next_seq else {
            return;
        };
        let Segment { mut data, seen } = segment;
        let rel = i64::from(seq.wrapping_sub(next_seq) as i32);
        let mut start = i128::from(self.next_offset) + i128::from(rel);

        if start < 0 {
            let before = (-start).min(data.len() as i128) as u64;
            stats.late_bytes += before;
            if before == data.len() as u64 {
                trace!(seq, len = before, "Segment below stream start");
                return;
            }
            data = data.slice(before as usize..);
            start = 0;
        }

        let len = data.len() as u64;
        let end = start + i128::from(len);
        let cursor = i128::from(self.next_offset);
        if end <= cursor {
            stats.duplicate_bytes += len;
            return;
        }
        let (offset, data) = if start < cursor {
            let trim = (cursor - start) as u64;
            stats.duplicate_bytes += trim;
            (self.next_offset, data.slice(trim as usize..))
        } else {
            (start as u64, data)
        };

        match self.pending.get(&offset) {
            Some(existing) if existing.data.len() >= data.len() => {
                stats.duplicate_bytes += data.len() as u64;
            }
            Some(existing) => {
                stats.duplicate_bytes += existing.data.len() as u64;
                self.pending.insert(offset, Segment { data, seen });
            }
            None => {
                self.pending.insert(offset, Segment { data, seen });
            }
        }

        self.pop_contiguous(out, stats);

        while self.pending.len() > self.capacity {
            match self.policy {
                OverflowPolicy::ForceFlush => {
                    self.skip_to_pending(out, stats);
                    self.pop_contiguous(out, stats);
                }
                OverflowPolicy::DropNewest => {
                    let victim = if self.pending.contains_key(&offset) {
                        self.pending.remove(&offset)
                    } else {
                        self.pending.pop_last().map(|(_, segment)| segment)
                    };
                    if let Some(segment) = victim {
                        stats.dropped_segments += 1;
                        trace!(offset, len = segment.data.len(), "Dropped segment over buffer bound");
                    }
                }
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pop_contiguous(&mut self, out: &mut Vec<Chunk>, stats: &mut ReassemblyStats) {
        while let Some(entry) = self.pending.first_entry() {
            let key = *entry.key();
            if key > self.next_offset {
                break;
            }
            let Segment { data, seen } = entry.remove();
            let end = key + data.len() as u64;
            if end <= self.next_offset {
                stats.duplicate_bytes += data.len() as u64;
                continue;
            }
            let skip = self.next_offset - key;
            stats.duplicate_bytes += skip;
            let bytes = data.slice(skip as usize..);
            self.advance(bytes.len() as u64);
            out.push(Chunk::Data { bytes, seen });
        }
    }

    fn skip_to_pending(&mut self, out: &mut Vec<Chunk>, stats: &mut ReassemblyStats) {
        let Some((&key, _)) = self.pending.first_key_value() else {
            return;
        };
        let missing = key.saturating_sub(self.next_offset);
        if missing == 0 {
            return;
        }
        self.advance(missing);
        self.gapped = true;
        stats.gaps += 1;
        stats.gap_bytes += missing;
        out.push(Chunk::Gap(missing));
    }

    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self, n: u64) {
        self.next_offset += n;
        // Sequence space is modulo 2^32.
        self.next_seq = self.next_seq.map(|seq| seq.wrapping_add(n as u32));
    }
}

// ============================================
// Connection State
// ============================================

/// Settings for a `Reassembler`.
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Max pending out-of-order segments per direction.
    pub packet_buf_size: usize,
    /// What to do past `packet_buf_size`.
    pub overflow_policy: OverflowPolicy,
    /// Capture-time silence after which a connection is finalized.
    pub idle_timeout: Duration,
    /// Largest wire message accepted by the decoders.
    pub max_message_size: usize,
}

impl From<&CaptureConfig> for ReassemblerConfig {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            packet_buf_size: config.packet_buf_size,
            overflow_policy: config.overflow_policy,
            idle_timeout: config.idle_timeout(),
            max_message_size: config.max_message_size,
        }
    }
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

struct Direction {
    flow: FlowKey,
    buffer: ReassemblyBuffer,
    decoder: StreamDecoder,
    fin: bool,
}

impl Direction {
    fn new(flow: FlowKey, config: &ReassemblerConfig) -> Self {
        Self {
            flow,
            buffer: ReassemblyBuffer::new(config.packet_buf_size, config.overflow_policy),
            decoder: StreamDecoder::new(WireCodec::with_max_message_size(config.max_message_size)),
            fin: false,
        }
    }

    fn deliver(
        &mut self,
        chunks: &mut Vec<Chunk>,
        connection_id: ConnectionId,
        stats: &mut ReassemblyStats,
        out: &mut Vec<OpWithTime>,
    ) {
        let mut decoded = Vec::new();
        for chunk in chunks.drain(..) {
            match chunk {
                Chunk::Data { bytes, seen } => {
                    self.decoder.feed(&bytes, stats, &mut decoded);
                    // Ops are stamped with the segment that completed them.
                    for DecodedOp { op, gap } in decoded.drain(..) {
                        trace!(connection = %connection_id, op = %op, "Decoded op");
                        let mut record =
                            OpWithTime::new(op, seen, connection_id, self.flow.src, self.flow.dst);
                        record.gap = gap;
                        out.push(record);
                    }
                }
                Chunk::Gap(missing) => {
                    debug!(
                        connection = %connection_id,
                        flow = %self.flow,
                        missing,
                        "Stream gap, resynchronising"
                    );
                    self.decoder.mark_gap(stats);
                }
            }
        }
    }
}

struct Connection {
    id: ConnectionId,
    forward: Direction,
    reverse: Direction,
    last_seen: CaptureTime,
}

impl Connection {
    fn new(id: ConnectionId, key: ConnectionKey, config: &ReassemblerConfig, ts: CaptureTime) -> Self {
        let (low, high) = key.endpoints();
        let forward = FlowKey::new(low, high);
        Self {
            id,
            forward: Direction::new(forward, config),
            reverse: Direction::new(forward.reversed(), config),
            last_seen: ts,
        }
    }

    fn is_drained(&self) -> bool {
        self.forward.buffer.pending_segments() == 0 && self.reverse.buffer.pending_segments() == 0
    }

    fn finalize(mut self, stats: &mut ReassemblyStats, out: &mut Vec<OpWithTime>) {
        let mut chunks = Vec::new();
        for dir in [&mut self.forward, &mut self.reverse] {
            dir.buffer.flush(&mut chunks, stats);
            dir.deliver(&mut chunks, self.id, stats, out);
            dir.decoder.finish(stats);
        }
        stats.connections_closed += 1;
    }
}

// ============================================
// Reassembler
// ============================================

/// Per-connection reassembly over a single sequential packet pass.
pub struct Reassembler {
    config: ReassemblerConfig,
    connections: HashMap<ConnectionKey, Connection>,
    next_id: ConnectionId,
    stats: ReassemblyStats,
    last_sweep: Option<CaptureTime>,
}

impl Reassembler {
    /// Creates an empty reassembler.
    #[must_use]
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            connections: HashMap::new(),
            next_id: ConnectionId::new(1),
            stats: ReassemblyStats::default(),
            last_sweep: None,
        }
    }

    /// Processes one packet, appending any completed ops to `out`.
    pub fn process(&mut self, packet: Packet, out: &mut Vec<OpWithTime>) {
        self.stats.packets += 1;
        self.stats.payload_bytes += packet.payload.len() as u64;
        self.sweep_idle(packet.ts, out);

        let key = packet.flow.connection_key();
        if !self.connections.contains_key(&key) {
            // Bare ACK/FIN/RST for a connection we never saw carry nothing to decode.
            if packet.payload.is_empty() && !packet.flags.syn() {
                self.stats.ignored_packets += 1;
                return;
            }
            let id = self.next_id;
            self.next_id = id.next();
            self.stats.connections_opened += 1;
            debug!(connection = %id, endpoints = %key, syn = packet.flags.syn(), "New connection");
            self.connections
                .insert(key, Connection::new(id, key, &self.config, packet.ts));
        }

        let Some(conn) = self.connections.get_mut(&key) else {
            return;
        };
        conn.last_seen = packet.ts;
        let id = conn.id;
        let dir = if key.is_forward(&packet.flow) {
            &mut conn.forward
        } else {
            &mut conn.reverse
        };

        let mut chunks = Vec::new();
        dir.buffer.push(
            packet.seq,
            packet.flags.syn(),
            packet.payload,
            packet.ts,
            &mut chunks,
            &mut self.stats,
        );
        if packet.flags.fin() {
            dir.fin = true;
            dir.buffer.anchor_at_lowest(&mut chunks, &mut self.stats);
        }
        dir.deliver(&mut chunks, id, &mut self.stats, out);

        let closing = packet.flags.rst()
            || (conn.forward.fin && conn.reverse.fin && conn.is_drained());
        if closing {
            if let Some(conn) = self.connections.remove(&key) {
                debug!(connection = %conn.id, rst = packet.flags.rst(), "Connection closed");
                conn.finalize(&mut self.stats, out);
            }
        }
    }

    /// Finalizes connections silent for longer than the idle timeout.
    pub fn sweep_idle(&mut self, now: CaptureTime, out: &mut Vec<OpWithTime>) {
        let interval = self.config.idle_timeout.min(MAX_SWEEP_INTERVAL);
        match self.last_sweep {
            Some(last) if now.saturating_duration_since(last) < interval => return,
            _ => self.last_sweep = Some(now),
        }

        let timeout = self.config.idle_timeout;
        let mut expired: Vec<(ConnectionId, ConnectionKey)> = self
            .connections
            .iter()
            .filter(|(_, c)| now.saturating_duration_since(c.last_seen) > timeout)
            .map(|(key, c)| (c.id, *key))
            .collect();
        expired.sort_unstable();

        for (_, key) in expired {
            if let Some(conn) = self.connections.remove(&key) {
                debug!(connection = %conn.id, idle_since = %conn.last_seen, "Connection idle, finalizing");
                conn.finalize(&mut self.stats, out);
            }
        }
    }

    /// Finalizes every open connection, in connection order.
    pub fn flush_all(&mut self, out: &mut Vec<OpWithTime>) {
        let mut conns: Vec<Connection> = self.connections.drain().map(|(_, c)| c).collect();
        conns.sort_unstable_by_key(|c| c.id);
        for conn in conns {
            conn.finalize(&mut self.stats, out);
        }
        if self.stats.gaps > 0 {
            warn!(
                gaps = self.stats.gaps,
                gap_bytes = self.stats.gap_bytes,
                "Capture had missing data"
            );
        }
    }

    /// Counts a frame whose headers could not be parsed.
    pub fn note_malformed(&mut self) {
        self.stats.malformed_packets += 1;
    }

    /// Counts a frame that carried no TCP segment.
    pub fn note_ignored(&mut self) {
        self.stats.ignored_packets += 1;
    }

    /// Number of connections still open.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }
}

impl std::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reassembler")
            .field("connections", &self.connections.len())
            .field("next_id", &self.next_id)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiretape_core::protocol::{encode_op, MsgHeader, Op, OpCode, QueryOp, RawDocument};
    use wiretape_transport::TcpFlags;

    const T0: CaptureTime = CaptureTime::from_unix_nanos(1_000_000_000);

    fn data(chunks: &[Chunk]) -> Vec<u8> {
        chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Data { bytes, .. } => Some(bytes.to_vec()),
                Chunk::Gap(_) => None,
            })
            .flatten()
            .collect()
    }

    fn push(buf: &mut ReassemblyBuffer, seq: u32, payload: &'static [u8], stats: &mut ReassemblyStats) -> Vec<Chunk> {
        let mut out = Vec::new();
        buf.push(seq, false, Bytes::from_static(payload), T0, &mut out, stats);
        out
    }

    fn syn(buf: &mut ReassemblyBuffer, seq: u32, stats: &mut ReassemblyStats) {
        let mut out = Vec::new();
        buf.push(seq, true, Bytes::new(), T0, &mut out, stats);
        assert!(out.is_empty());
    }

    #[test]
    fn test_in_order_delivery() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        syn(&mut buf, 99, &mut stats);
        let mut out = push(&mut buf, 100, b"abc", &mut stats);
        out.extend(push(&mut buf, 103, b"def", &mut stats));
        assert_eq!(data(&out), b"abcdef");
        assert_eq!(buf.next_offset(), 6);
    }

    #[test]
    fn test_out_of_order_waits_for_hole() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        syn(&mut buf, 0, &mut stats);

        assert!(push(&mut buf, 4, b"def", &mut stats).is_empty());
        assert_eq!(buf.pending_segments(), 1);
        let out = push(&mut buf, 1, b"abc", &mut stats);
        assert_eq!(data(&out), b"abcdef");
        assert_eq!(buf.pending_segments(), 0);
        assert!(!buf.has_gap());
    }

    #[test]
    fn test_without_syn_starts_at_lowest_sequence() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        let mut out = push(&mut buf, 103, b"def", &mut stats);
        out.extend(push(&mut buf, 100, b"abc", &mut stats));
        out.extend(push(&mut buf, 106, b"ghi", &mut stats));
        assert!(out.is_empty());
        assert!(!buf.is_anchored());
        assert_eq!(buf.pending_segments(), 3);

        buf.flush(&mut out, &mut stats);
        assert_eq!(data(&out), b"abcdefghi");
        assert!(!buf.has_gap());
        assert_eq!(stats.duplicate_bytes, 0);
        assert_eq!(stats.gaps, 0);
    }

    #[test]
    fn test_without_syn_anchors_on_overflow() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(2, OverflowPolicy::ForceFlush);
        push(&mut buf, 1_004, b"ee", &mut stats);
        push(&mut buf, 1_000, b"aa", &mut stats);
        let out = push(&mut buf, 1_002, b"cc", &mut stats);
        assert!(buf.is_anchored());
        assert_eq!(data(&out), b"aaccee");

        // Anything below the chosen start is late, not a retransmission.
        let late = push(&mut buf, 998, b"zz", &mut stats);
        assert!(late.is_empty());
        assert_eq!(stats.late_bytes, 2);
        assert_eq!(stats.duplicate_bytes, 0);
    }

    #[test]
    fn test_chunks_carry_segment_time() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        let later = CaptureTime::from_unix_nanos(2_000_000_000);
        let mut out = Vec::new();
        buf.push(0, true, Bytes::new(), T0, &mut out, &mut stats);
        buf.push(4, false, Bytes::from_static(b"def"), later, &mut out, &mut stats);
        buf.push(1, false, Bytes::from_static(b"abc"), T0, &mut out, &mut stats);
        assert_eq!(
            out,
            vec![
                Chunk::Data { bytes: Bytes::from_static(b"abc"), seen: T0 },
                Chunk::Data { bytes: Bytes::from_static(b"def"), seen: later },
            ]
        );
    }

    #[test]
    fn test_retransmit_and_overlap_trimmed() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        syn(&mut buf, 9, &mut stats);
        let mut out = push(&mut buf, 10, b"abcd", &mut stats);
        out.extend(push(&mut buf, 10, b"abcd", &mut stats));
        out.extend(push(&mut buf, 12, b"cdef", &mut stats));
        assert_eq!(data(&out), b"abcdef");
        assert_eq!(stats.duplicate_bytes, 6);
    }

    #[test]
    fn test_sequence_wraparound() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        syn(&mut buf, u32::MAX - 2, &mut stats);
        let mut out = push(&mut buf, u32::MAX - 1, b"ab", &mut stats);
        out.extend(push(&mut buf, 2, b"ef", &mut stats));
        out.extend(push(&mut buf, 0, b"cd", &mut stats));
        assert_eq!(data(&out), b"abcdef");
    }

    #[test]
    fn test_unanchored_lowest_across_wrap() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        let mut out = push(&mut buf, 0, b"cd", &mut stats);
        out.extend(push(&mut buf, u32::MAX - 1, b"ab", &mut stats));
        buf.flush(&mut out, &mut stats);
        assert_eq!(data(&out), b"abcd");
        assert_eq!(stats.gaps, 0);
    }

    #[test]
    fn test_force_flush_marks_gap() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(2, OverflowPolicy::ForceFlush);
        syn(&mut buf, u32::MAX, &mut stats);
        let mut out = push(&mut buf, 0, b"aa", &mut stats);
        // Bytes 2..4 never arrive.
        out.extend(push(&mut buf, 4, b"cc", &mut stats));
        out.extend(push(&mut buf, 8, b"ee", &mut stats));
        assert!(buf.pending_segments() <= 2);
        out.extend(push(&mut buf, 12, b"gg", &mut stats));

        assert!(buf.has_gap());
        assert!(buf.pending_segments() <= 2);
        assert!(out.contains(&Chunk::Gap(2)));
        assert_eq!(stats.gaps, 1);
        assert_eq!(stats.gap_bytes, 2);
        assert!(data(&out).starts_with(b"aacc"));
    }

    #[test]
    fn test_drop_newest_keeps_bound() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(2, OverflowPolicy::DropNewest);
        syn(&mut buf, u32::MAX, &mut stats);
        push(&mut buf, 0, b"aa", &mut stats);
        push(&mut buf, 4, b"cc", &mut stats);
        push(&mut buf, 6, b"dd", &mut stats);
        push(&mut buf, 8, b"ee", &mut stats);
        assert_eq!(buf.pending_segments(), 2);
        assert_eq!(stats.dropped_segments, 1);
        assert!(!buf.has_gap());
    }

    #[test]
    fn test_flush_skips_holes() {
        let mut stats = ReassemblyStats::default();
        let mut buf = ReassemblyBuffer::new(8, OverflowPolicy::ForceFlush);
        syn(&mut buf, u32::MAX, &mut stats);
        let mut out = push(&mut buf, 0, b"aa", &mut stats);
        out.extend(push(&mut buf, 5, b"bb", &mut stats));
        buf.flush(&mut out, &mut stats);
        assert_eq!(
            out.last(),
            Some(&Chunk::Data { bytes: Bytes::from_static(b"bb"), seen: T0 })
        );
        assert_eq!(stats.gap_bytes, 3);
    }

    // ----- connection level -----

    fn client() -> std::net::SocketAddr {
        "10.0.0.1:50000".parse().unwrap()
    }

    fn server() -> std::net::SocketAddr {
        "10.0.0.2:27017".parse().unwrap()
    }

    fn query_wire(request_id: i32) -> Bytes {
        encode_op(&Op::Query(QueryOp {
            header: MsgHeader {
                message_length: 0,
                request_id,
                response_to: 0,
                op_code: OpCode::Query.as_i32(),
            },
            flags: 0,
            namespace: "db.c".into(),
            skip: 0,
            limit: 0,
            query: RawDocument::empty(),
            return_fields: None,
        }))
    }

    fn packet(src: std::net::SocketAddr, dst: std::net::SocketAddr, seq: u32, flags: u8, payload: Bytes, ms: i64) -> Packet {
        Packet {
            flow: FlowKey::new(src, dst),
            seq,
            flags: TcpFlags::from_bits(flags),
            payload,
            ts: CaptureTime::from_unix_nanos(1_000_000_000 + ms * 1_000_000),
        }
    }

    #[test]
    fn test_message_split_across_segments() {
        let mut r = Reassembler::new(ReassemblerConfig::default());
        let wire = query_wire(7);
        let mut out = Vec::new();
        r.process(packet(client(), server(), 0, TcpFlags::SYN, Bytes::new(), 0), &mut out);
        r.process(packet(client(), server(), 1, TcpFlags::ACK, wire.slice(..10), 1), &mut out);
        assert!(out.is_empty());
        r.process(packet(client(), server(), 11, TcpFlags::ACK, wire.slice(10..), 2), &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].op.header().request_id, 7);
        assert_eq!(out[0].src, client());
        assert_eq!(out[0].connection_id, ConnectionId::new(1));
        assert_eq!(out[0].seen, CaptureTime::from_unix_nanos(1_002_000_000));
    }

    #[test]
    fn test_fin_both_sides_closes() {
        let mut r = Reassembler::new(ReassemblerConfig::default());
        let mut out = Vec::new();
        r.process(packet(client(), server(), 0, TcpFlags::ACK, query_wire(1), 0), &mut out);
        r.process(packet(client(), server(), 100, TcpFlags::FIN, Bytes::new(), 1), &mut out);
        assert_eq!(r.active_connections(), 1);
        r.process(packet(server(), client(), 5, TcpFlags::FIN, Bytes::new(), 2), &mut out);
        assert_eq!(r.active_connections(), 0);
        assert_eq!(r.stats().connections_closed, 1);

        // Late ACK for the closed connection does not reopen it.
        r.process(packet(client(), server(), 101, TcpFlags::ACK, Bytes::new(), 3), &mut out);
        assert_eq!(r.active_connections(), 0);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_rst_and_idle_finalize() {
        let mut r = Reassembler::new(ReassemblerConfig {
            idle_timeout: Duration::from_secs(5),
            ..ReassemblerConfig::default()
        });
        let other: std::net::SocketAddr = "10.0.0.3:40000".parse().unwrap();
        let mut out = Vec::new();
        r.process(packet(client(), server(), 0, TcpFlags::ACK, query_wire(1), 0), &mut out);
        r.process(packet(other, server(), 0, TcpFlags::ACK, query_wire(2), 0), &mut out);
        r.process(packet(other, server(), 0, TcpFlags::RST, Bytes::new(), 10), &mut out);
        assert_eq!(r.active_connections(), 1);

        r.process(packet(other, server(), 50, TcpFlags::ACK, Bytes::new(), 7_000), &mut out);
        assert_eq!(r.active_connections(), 0);
        assert_eq!(r.stats().connections_opened, 2);
        assert_eq!(r.stats().connections_closed, 2);
    }

    #[test]
    fn test_connections_get_distinct_ids() {
        let mut r = Reassembler::new(ReassemblerConfig::default());
        let other: std::net::SocketAddr = "10.0.0.3:40000".parse().unwrap();
        let first = query_wire(1);
        let next_seq = 1 + u32::try_from(first.len()).unwrap();
        let mut out = Vec::new();
        r.process(packet(client(), server(), 0, TcpFlags::SYN, Bytes::new(), 0), &mut out);
        r.process(packet(client(), server(), 1, TcpFlags::ACK, first, 0), &mut out);
        r.process(packet(other, server(), 0, TcpFlags::SYN, Bytes::new(), 1), &mut out);
        r.process(packet(other, server(), 1, TcpFlags::ACK, query_wire(2), 1), &mut out);
        r.process(packet(client(), server(), next_seq, TcpFlags::ACK, query_wire(3), 2), &mut out);
        let ids: Vec<u64> = out.iter().map(|o| o.connection_id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 1]);
    }

    #[test]
    fn test_idle_sweep_flushes_out_of_order_data() {
        let mut r = Reassembler::new(ReassemblerConfig {
            idle_timeout: Duration::from_secs(5),
            ..ReassemblerConfig::default()
        });
        let first = query_wire(1);
        let lost = query_wire(2);
        let third = query_wire(3);
        let len = |b: &Bytes| u32::try_from(b.len()).unwrap();
        let mut out = Vec::new();
        r.process(packet(client(), server(), 0, TcpFlags::SYN, Bytes::new(), 0), &mut out);
        r.process(packet(client(), server(), 1, TcpFlags::ACK, first.clone(), 1), &mut out);
        // The second query never makes it into the capture.
        let third_seq = 1 + len(&first) + len(&lost);
        r.process(packet(client(), server(), third_seq, TcpFlags::ACK, third, 2), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(r.active_connections(), 1);

        let other: std::net::SocketAddr = "10.0.0.3:40000".parse().unwrap();
        r.process(packet(other, server(), 0, TcpFlags::SYN, Bytes::new(), 8_000), &mut out);

        assert_eq!(r.active_connections(), 1);
        assert_eq!(r.stats().connections_closed, 1);
        assert_eq!(r.stats().gaps, 1);
        assert_eq!(r.stats().gap_bytes, u64::from(len(&lost)));
        let ids: Vec<i32> = out.iter().map(|o| o.op.header().request_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(!out[0].gap);
        assert!(out[1].gap);
    }
}
