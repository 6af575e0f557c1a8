// ============================================
// File: crates/wiretape-transport/src/capture/mock.rs
// ============================================
//! # Synthetic Capture Helpers
//!
//! ## Creation Reason
//! Lets tests build captures without tcpdump: hand-assembled
//! Ethernet/IP/TCP frames, classic pcap byte streams and an in-memory
//! `PacketSource`.
//!
//! ## Usage in Tests
//! ```ignore
//! use wiretape_common::CaptureTime;
//! use wiretape_transport::capture::frame::TcpFlags;
//! use wiretape_transport::capture::mock::{pcap_bytes, tcp_frame};
//!
//! let frame = tcp_frame(
//!     "10.0.0.1:50000".parse().unwrap(),
//!     "10.0.0.2:27017".parse().unwrap(),
//!     1,
//!     TcpFlags::ACK,
//!     b"payload",
//! );
//! let file = pcap_bytes(&[(CaptureTime::from_secs_micros(1, 0), frame)]);
//! assert!(file.len() > 24);
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - IP and TCP checksums are left zero
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use bytes::Bytes;

use wiretape_common::CaptureTime;

use crate::capture::frame::LinkType;
use crate::error::Result;
use crate::traits::{PacketSource, RawFrame};

// ============================================
// MemorySource
// ============================================

/// `PacketSource` replaying a fixed list of frames.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<RawFrame>,
}

impl MemorySource {
    /// Creates a source from `(timestamp, ethernet frame)` pairs.
    #[must_use]
    pub fn ethernet(frames: Vec<(CaptureTime, Vec<u8>)>) -> Self {
        Self {
            frames: frames
                .into_iter()
                .map(|(ts, data)| RawFrame {
                    link_type: LinkType::Ethernet,
                    orig_len: u32::try_from(data.len()).unwrap_or(u32::MAX),
                    data: Bytes::from(data),
                    ts,
                })
                .collect(),
        }
    }

    /// Number of frames not yet returned.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl PacketSource for MemorySource {
    async fn next_packet(&mut self) -> Result<Option<RawFrame>> {
        Ok(self.frames.pop_front())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

// ============================================
// Frame Builders
// ============================================

/// Builds an Ethernet + IPv4 + TCP frame.
///
/// # Panics
/// Panics if either address is IPv6.
#[must_use]
pub fn tcp_frame(src: SocketAddr, dst: SocketAddr, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let (IpAddr::V4(src_ip), IpAddr::V4(dst_ip)) = (src.ip(), dst.ip()) else {
        panic!("tcp_frame builds IPv4 frames only");
    };
    let mut pkt = Vec::with_capacity(54 + payload.len());
    pkt.extend_from_slice(&[0u8; 12]);
    pkt.extend_from_slice(&0x0800u16.to_be_bytes());

    let total_len = u16::try_from(20 + 20 + payload.len()).unwrap_or(u16::MAX);
    pkt.push(0x45);
    pkt.push(0);
    pkt.extend_from_slice(&total_len.to_be_bytes());
    pkt.extend_from_slice(&[0, 0, 0x40, 0]); // id, DF
    pkt.push(64);
    pkt.push(6);
    pkt.extend_from_slice(&[0; 2]);
    pkt.extend_from_slice(&src_ip.octets());
    pkt.extend_from_slice(&dst_ip.octets());

    push_tcp(&mut pkt, src.port(), dst.port(), seq, flags, payload);
    pkt
}

/// Builds an Ethernet + IPv6 + TCP frame.
///
/// # Panics
/// Panics if either address is IPv4.
#[must_use]
pub fn ipv6_tcp_frame(
    src: SocketAddr,
    dst: SocketAddr,
    seq: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let (IpAddr::V6(src_ip), IpAddr::V6(dst_ip)) = (src.ip(), dst.ip()) else {
        panic!("ipv6_tcp_frame builds IPv6 frames only");
    };
    let mut pkt = Vec::with_capacity(74 + payload.len());
    pkt.extend_from_slice(&[0u8; 12]);
    pkt.extend_from_slice(&0x86DDu16.to_be_bytes());

    let payload_len = u16::try_from(20 + payload.len()).unwrap_or(u16::MAX);
    pkt.extend_from_slice(&[0x60, 0, 0, 0]);
    pkt.extend_from_slice(&payload_len.to_be_bytes());
    pkt.push(6);
    pkt.push(64);
    pkt.extend_from_slice(&src_ip.octets());
    pkt.extend_from_slice(&dst_ip.octets());

    push_tcp(&mut pkt, src.port(), dst.port(), seq, flags, payload);
    pkt
}

fn push_tcp(pkt: &mut Vec<u8>, src_port: u16, dst_port: u16, seq: u32, flags: u8, payload: &[u8]) {
    pkt.extend_from_slice(&src_port.to_be_bytes());
    pkt.extend_from_slice(&dst_port.to_be_bytes());
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&0u32.to_be_bytes());
    pkt.push(0x50);
    pkt.push(flags);
    pkt.extend_from_slice(&65535u16.to_be_bytes());
    pkt.extend_from_slice(&[0; 4]);
    pkt.extend_from_slice(payload);
}

// ============================================
// Pcap Builder
// ============================================

/// Serializes Ethernet frames as a little-endian microsecond pcap file.
#[must_use]
pub fn pcap_bytes(frames: &[(CaptureTime, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&LinkType::Ethernet.as_pcap().to_le_bytes());

    for (ts, frame) in frames {
        let nanos = ts.as_unix_nanos();
        let secs = u32::try_from(nanos / 1_000_000_000).unwrap_or(0);
        let micros = u32::try_from((nanos % 1_000_000_000) / 1_000).unwrap_or(0);
        let len = u32::try_from(frame.len()).unwrap_or(u32::MAX);
        out.extend_from_slice(&secs.to_le_bytes());
        out.extend_from_slice(&micros.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(frame);
    }
    out
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{parse_frame, TcpFlags};

    #[tokio::test]
    async fn test_memory_source_drains() {
        let frame = tcp_frame(
            "10.0.0.1:1".parse().unwrap(),
            "10.0.0.2:2".parse().unwrap(),
            9,
            TcpFlags::ACK,
            b"x",
        );
        let mut source = MemorySource::ethernet(vec![(CaptureTime::ZERO, frame)]);
        assert_eq!(source.remaining(), 1);
        let raw = source.next_packet().await.unwrap().unwrap();
        let packet = parse_frame(raw.link_type, &raw.data, raw.ts).unwrap().unwrap();
        assert_eq!(packet.seq, 9);
        assert!(source.next_packet().await.unwrap().is_none());
    }
}
