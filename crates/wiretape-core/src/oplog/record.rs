// ============================================
// File: crates/wiretape-core/src/oplog/record.rs
// ============================================
//! # Operation Log Record
//!
//! ## Creation Reason
//! Serializes one captured op together with its capture metadata so a
//! recording can be replayed later with the original timing and
//! connection layout.
//!
//! ## Wire Format (Little Endian)
//! ```text
//! ┌──────────────┬─────┬───────┬───────┬──────┬───────────────┐
//! │ recordLength │ ver │ flags │ order │ seen │ connection_id │
//! │     u32      │ u8  │  u8   │  u64  │ i64  │      u64      │
//! ├──────────────┴─────┴───────┴───────┴──────┴───────────────┤
//! │ src addr: family u8 (4|6), 4|16 address bytes, port u16   │
//! │ dst addr: same layout                                     │
//! ├───────────────────────────────────────────────────────────┤
//! │ wire message: exact bytes of encode(op), self-framed      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `recordLength` includes itself
//! - Bump `RECORD_FORMAT_VERSION` for ANY layout change
//! - IPv6 flow info and scope ids are not persisted
//!
//! ## Last Modified
//! v0.1.0 - Initial record format

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use wiretape_common::{CaptureTime, ConnectionId};

use crate::error::{CoreError, Result};
use crate::protocol::{Codec, MsgHeader, Op, WireCodec, HEADER_SIZE, MAX_MESSAGE_SIZE};

// ============================================
// Constants
// ============================================

/// Current record format version.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Size of the fixed record prefix (length through connection id).
pub const RECORD_PREFIX_SIZE: usize = 4 + 1 + 1 + 8 + 8 + 8;

/// Smallest possible record: prefix, two IPv4 addresses, a bare header.
pub const MIN_RECORD_SIZE: usize = RECORD_PREFIX_SIZE + 2 * ADDR_V4_SIZE + HEADER_SIZE;

/// Largest record accepted when reading.
pub const MAX_RECORD_SIZE: usize = RECORD_PREFIX_SIZE + 2 * ADDR_V6_SIZE + MAX_MESSAGE_SIZE;

const ADDR_V4_SIZE: usize = 1 + 4 + 2;
const ADDR_V6_SIZE: usize = 1 + 16 + 2;

const FLAG_GAP: u8 = 0b0000_0001;

// ============================================
// OpWithTime
// ============================================

/// A captured op with the metadata needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpWithTime {
    /// The decoded operation.
    pub op: Op,
    /// Capture time of the chunk that completed the message.
    pub seen: CaptureTime,
    /// Connection the op was observed on.
    pub connection_id: ConnectionId,
    /// Sending endpoint.
    pub src: SocketAddr,
    /// Receiving endpoint.
    pub dst: SocketAddr,
    /// Position in the capture output.
    pub order: u64,
    /// Whether bytes were lost in this direction before the op.
    pub gap: bool,
}

impl OpWithTime {
    /// Creates a record with `order` 0 and no gap.
    #[must_use]
    pub fn new(
        op: Op,
        seen: CaptureTime,
        connection_id: ConnectionId,
        src: SocketAddr,
        dst: SocketAddr,
    ) -> Self {
        Self {
            op,
            seen,
            connection_id,
            src,
            dst,
            order: 0,
            gap: false,
        }
    }
}

// ============================================
// RecordCodec
// ============================================

/// Codec for operation-log records.
#[derive(Debug, Default, Clone)]
pub struct RecordCodec {
    wire: WireCodec,
}

impl RecordCodec {
    /// Creates a record codec with the default wire codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wire: WireCodec::new(),
        }
    }

    /// Checks if the buffer starts with a complete record.
    ///
    /// # Returns
    /// - `Ok(Some(len))` - Complete record of `len` bytes
    /// - `Ok(None)` - Incomplete record, need more data
    ///
    /// # Errors
    /// `MalformedRecord` if the length prefix is impossible.
    pub fn check_complete(buf: &[u8]) -> Result<Option<usize>> {
        let Some(len) = Self::peek_len(buf) else {
            return Ok(None);
        };
        if !(MIN_RECORD_SIZE..=MAX_RECORD_SIZE).contains(&len) {
            return Err(CoreError::malformed_record(format!(
                "record length {len} outside [{MIN_RECORD_SIZE}, {MAX_RECORD_SIZE}]"
            )));
        }
        if buf.len() < len {
            return Ok(None);
        }
        Ok(Some(len))
    }

    /// Reads the length prefix, if four bytes are available.
    #[must_use]
    pub fn peek_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < 4 {
            return None;
        }
        usize::try_from(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])).ok()
    }

    /// Checks a record cut short by end of input against the wire header
    /// it embeds.
    ///
    /// A torn final write leaves a prefix whose length still matches the
    /// embedded message. A corrupted length prefix does not.
    ///
    /// # Errors
    /// `UnsupportedRecordVersion` or `MalformedRecord` if the partial bytes
    /// contradict the declared record length. Too few bytes to tell is `Ok`.
    pub fn check_partial(buf: &[u8]) -> Result<()> {
        let Some(len) = Self::peek_len(buf) else {
            return Ok(());
        };
        if buf.len() < RECORD_PREFIX_SIZE {
            return Ok(());
        }
        if buf[4] != RECORD_FORMAT_VERSION {
            return Err(CoreError::UnsupportedRecordVersion {
                got: buf[4],
                expected: RECORD_FORMAT_VERSION,
            });
        }

        let mut wire_at = RECORD_PREFIX_SIZE;
        for _ in 0..2 {
            let Some(family) = buf.get(wire_at) else {
                return Ok(());
            };
            wire_at += match *family {
                4 => ADDR_V4_SIZE,
                6 => ADDR_V6_SIZE,
                other => {
                    return Err(CoreError::malformed_record(format!(
                        "unknown address family {other}"
                    )))
                }
            };
        }
        let Some(header) = buf.get(wire_at..).and_then(MsgHeader::peek) else {
            return Ok(());
        };
        let expected = len.saturating_sub(wire_at);
        if usize::try_from(header.message_length).ok() != Some(expected) {
            return Err(CoreError::malformed_record(format!(
                "record length {len} leaves {expected} bytes for a {} byte message",
                header.message_length
            )));
        }
        Ok(())
    }

    /// Serializes a record into a fresh buffer.
    #[must_use]
    pub fn encode_to_bytes(&self, record: &OpWithTime) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(record, &mut buf);
        buf.freeze()
    }
}

impl Codec<OpWithTime> for RecordCodec {
    fn encode(&self, msg: &OpWithTime, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u32_le(0);
        buf.put_u8(RECORD_FORMAT_VERSION);
        buf.put_u8(if msg.gap { FLAG_GAP } else { 0 });
        buf.put_u64_le(msg.order);
        buf.put_i64_le(msg.seen.as_unix_nanos());
        buf.put_u64_le(msg.connection_id.as_u64());
        put_addr(buf, &msg.src);
        put_addr(buf, &msg.dst);
        self.wire.encode(&msg.op, buf);

        let total = u32::try_from(buf.len() - start).unwrap_or(u32::MAX);
        buf[start..start + 4].copy_from_slice(&total.to_le_bytes());
    }

    fn decode(&self, buf: &mut Bytes) -> Result<OpWithTime> {
        let len = Self::check_complete(buf)?
            .ok_or_else(|| CoreError::too_short(MIN_RECORD_SIZE, buf.len()))?;
        let mut rec = buf.split_to(len);
        rec.advance(4);

        let version = rec.get_u8();
        if version != RECORD_FORMAT_VERSION {
            return Err(CoreError::UnsupportedRecordVersion {
                got: version,
                expected: RECORD_FORMAT_VERSION,
            });
        }
        let flags = rec.get_u8();
        let order = rec.get_u64_le();
        let seen = CaptureTime::from_unix_nanos(rec.get_i64_le());
        let connection_id = ConnectionId::new(rec.get_u64_le());
        let src = get_addr(&mut rec)?;
        let dst = get_addr(&mut rec)?;

        let op = self.wire.decode_frame(rec).map_err(|e| {
            CoreError::malformed_record(format!("embedded message: {e}"))
        })?;

        Ok(OpWithTime {
            op,
            seen,
            connection_id,
            src,
            dst,
            order,
            gap: flags & FLAG_GAP != 0,
        })
    }
}

// ============================================
// Address Encoding
// ============================================

fn put_addr(buf: &mut BytesMut, addr: &SocketAddr) {
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(4);
            buf.put_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(6);
            buf.put_slice(&ip.octets());
        }
    }
    buf.put_u16_le(addr.port());
}

fn get_addr(buf: &mut Bytes) -> Result<SocketAddr> {
    if !buf.has_remaining() {
        return Err(CoreError::malformed_record("missing address"));
    }
    let ip = match buf.get_u8() {
        4 if buf.remaining() >= 4 + 2 => {
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        6 if buf.remaining() >= 16 + 2 => {
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        family @ (4 | 6) => {
            return Err(CoreError::malformed_record(format!(
                "truncated IPv{family} address"
            )))
        }
        other => {
            return Err(CoreError::malformed_record(format!(
                "unknown address family {other}"
            )))
        }
    };
    Ok(SocketAddr::new(ip, buf.get_u16_le()))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::tests::{get_more_bytes, query_bytes};
    use crate::protocol::decode_op;

    fn sample(bytes: &[u8], src: &str, dst: &str) -> OpWithTime {
        let (op, _) = decode_op(bytes).unwrap().unwrap();
        OpWithTime {
            op,
            seen: CaptureTime::from_secs_micros(1_700_000_000, 123_456),
            connection_id: ConnectionId::new(3),
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            order: 17,
            gap: true,
        }
    }

    #[test]
    fn test_record_roundtrip_v4_and_v6() {
        let codec = RecordCodec::new();
        for record in [
            sample(&query_bytes(1, "db.c", true), "10.0.0.1:50000", "10.0.0.2:27017"),
            sample(&get_more_bytes(2, "db.c", 42), "[::1]:50001", "[2001:db8::2]:27017"),
        ] {
            let mut bytes = codec.encode_to_bytes(&record);
            assert_eq!(RecordCodec::peek_len(&bytes), Some(bytes.len()));
            let decoded = codec.decode(&mut bytes).unwrap();
            assert_eq!(decoded, record);
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn test_record_embeds_exact_wire_bytes() {
        let wire = query_bytes(9, "db.c", false);
        let record = sample(&wire, "10.0.0.1:1", "10.0.0.2:2");
        let bytes = RecordCodec::new().encode_to_bytes(&record);
        assert!(bytes.ends_with(&wire));
    }

    #[test]
    fn test_check_complete_partial() {
        let record = sample(&query_bytes(1, "db.c", false), "10.0.0.1:1", "10.0.0.2:2");
        let bytes = RecordCodec::new().encode_to_bytes(&record);
        assert_eq!(RecordCodec::check_complete(&bytes[..3]).unwrap(), None);
        assert_eq!(RecordCodec::check_complete(&bytes[..bytes.len() - 1]).unwrap(), None);
        assert_eq!(RecordCodec::check_complete(&bytes).unwrap(), Some(bytes.len()));
    }

    #[test]
    fn test_partial_record_consistency() {
        let record = sample(&query_bytes(1, "db.c", false), "10.0.0.1:1", "[::1]:2");
        let bytes = RecordCodec::new().encode_to_bytes(&record).to_vec();
        for cut in [2, RECORD_PREFIX_SIZE - 1, RECORD_PREFIX_SIZE + 3, bytes.len() - 1] {
            assert!(RecordCodec::check_partial(&bytes[..cut]).is_ok(), "cut {cut}");
        }

        let mut grown = bytes.clone();
        let bigger = u32::try_from(bytes.len() + 4096).unwrap();
        grown[..4].copy_from_slice(&bigger.to_le_bytes());
        let err = RecordCodec::check_partial(&grown).unwrap_err();
        assert!(err.is_record_error());
    }

    #[test]
    fn test_impossible_length_is_error() {
        let err = RecordCodec::check_complete(&[3, 0, 0, 0, 1]).unwrap_err();
        assert!(err.is_record_error());
    }

    #[test]
    fn test_version_and_family_checks() {
        let codec = RecordCodec::new();
        let record = sample(&query_bytes(1, "db.c", false), "10.0.0.1:1", "10.0.0.2:2");
        let good = codec.encode_to_bytes(&record);

        let mut bad_version = good.to_vec();
        bad_version[4] = 9;
        let err = codec.decode(&mut Bytes::from(bad_version)).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedRecordVersion { got: 9, .. }));

        let mut bad_family = good.to_vec();
        bad_family[RECORD_PREFIX_SIZE] = 5;
        let err = codec.decode(&mut Bytes::from(bad_family)).unwrap_err();
        assert!(err.is_record_error());
    }
}
