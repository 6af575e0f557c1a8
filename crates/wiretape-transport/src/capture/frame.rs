// ============================================
// File: crates/wiretape-transport/src/capture/frame.rs
// ============================================
//! # Frame Parsing
//!
//! ## Creation Reason
//! Turns a captured link-layer frame into a TCP `Packet` the reassembler
//! can consume: flow identity, sequence number, flags and payload.
//!
//! ## Main Functionality
//! - `LinkType`: Supported pcap link-layer types
//! - `TcpFlags`: SYN/FIN/RST/ACK bit set
//! - `Packet`: Parsed TCP segment with capture time
//! - `parse_frame()`: Link → IP → TCP parsing
//!
//! ## Parsing Flow
//! ```text
//! frame ──► link header ──► IPv4 / IPv6 ──► TCP ──► Packet
//!   │            │               │            │
//!   │            └─ non-IP ──────┴─ non-TCP ──┴──► Ok(None)
//!   └─ truncated / inconsistent headers ─────────► Err(MalformedPacket)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Ethernet frames may be padded; always trim to the IP length
//! - IP fragments are ignored (database traffic is not fragmented in practice)
//! - Payload slices share the frame's `Bytes` buffer
//!
//! ## Last Modified
//! v0.1.0 - Initial frame parser

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;

use wiretape_common::{CaptureTime, FlowKey};

use crate::error::{Result, TransportError};

// ============================================
// Constants
// ============================================

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;

const IPPROTO_TCP: u8 = 6;

const IPV6_HOP_BY_HOP: u8 = 0;
const IPV6_ROUTING: u8 = 43;
const IPV6_DEST_OPTS: u8 = 60;

const ETHERNET_HEADER_LEN: usize = 14;
const SLL_HEADER_LEN: usize = 16;
const NULL_HEADER_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_MIN_HEADER_LEN: usize = 20;

// ============================================
// LinkType
// ============================================

/// Link-layer header type of captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// BSD loopback: 4-byte address family in host byte order.
    Null,
    /// IEEE 802.3 Ethernet.
    Ethernet,
    /// Raw IPv4/IPv6 without link header.
    Raw,
    /// Linux "cooked" capture (SLL).
    LinuxSll,
}

impl LinkType {
    /// Converts a pcap `network` field value.
    #[must_use]
    pub const fn from_pcap(network: u32) -> Option<Self> {
        match network {
            0 => Some(Self::Null),
            1 => Some(Self::Ethernet),
            12 | 101 => Some(Self::Raw),
            113 => Some(Self::LinuxSll),
            _ => None,
        }
    }

    /// Returns the canonical pcap `network` value.
    #[must_use]
    pub const fn as_pcap(&self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Ethernet => 1,
            Self::Raw => 101,
            Self::LinuxSll => 113,
        }
    }
}

// ============================================
// TcpFlags
// ============================================

/// TCP control bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpFlags(u8);

impl TcpFlags {
    /// No more data from sender.
    pub const FIN: u8 = 0x01;
    /// Synchronize sequence numbers.
    pub const SYN: u8 = 0x02;
    /// Reset the connection.
    pub const RST: u8 = 0x04;
    /// Push function.
    pub const PSH: u8 = 0x08;
    /// Acknowledgment field is significant.
    pub const ACK: u8 = 0x10;

    /// Creates flags from the raw TCP flag byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw flag byte.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// SYN set.
    #[must_use]
    pub const fn syn(&self) -> bool {
        self.0 & Self::SYN != 0
    }

    /// FIN set.
    #[must_use]
    pub const fn fin(&self) -> bool {
        self.0 & Self::FIN != 0
    }

    /// RST set.
    #[must_use]
    pub const fn rst(&self) -> bool {
        self.0 & Self::RST != 0
    }

    /// ACK set.
    #[must_use]
    pub const fn ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }
}

impl fmt::Debug for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::SYN, "SYN"),
            (Self::FIN, "FIN"),
            (Self::RST, "RST"),
            (Self::PSH, "PSH"),
            (Self::ACK, "ACK"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", set.join("|"))
    }
}

// ============================================
// Packet
// ============================================

/// A parsed TCP segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Direction of the segment.
    pub flow: FlowKey,
    /// Sequence number of the first payload byte (or of the SYN).
    pub seq: u32,
    /// TCP control bits.
    pub flags: TcpFlags,
    /// Segment payload.
    pub payload: Bytes,
    /// Capture timestamp.
    pub ts: CaptureTime,
}

// ============================================
// Parsing
// ============================================

/// Parses a captured frame down to its TCP segment.
///
/// # Returns
/// - `Ok(Some(packet))` - A TCP segment
/// - `Ok(None)` - Valid frame that does not carry TCP (ARP, UDP, fragments, ...)
///
/// # Errors
/// `MalformedPacket` when a header is truncated or inconsistent.
pub fn parse_frame(link_type: LinkType, frame: &Bytes, ts: CaptureTime) -> Result<Option<Packet>> {
    let data: &[u8] = frame;
    let Some((version, ip_start)) = link_payload(link_type, data)? else {
        return Ok(None);
    };

    let ip = &data[ip_start..];
    let parsed = match version {
        IpVersion::V4 => parse_ipv4(ip)?,
        IpVersion::V6 => parse_ipv6(ip)?,
    };
    let Some(l3) = parsed else {
        return Ok(None);
    };

    let tcp_start = ip_start + l3.header_len;
    let tcp_end = ip_start + l3.total_len;
    let tcp = &data[tcp_start..tcp_end];
    if tcp.len() < TCP_MIN_HEADER_LEN {
        return Err(TransportError::malformed(
            "tcp",
            format!("{} bytes, need {TCP_MIN_HEADER_LEN}", tcp.len()),
        ));
    }
    let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
    let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
    let seq = u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]);
    let data_offset = usize::from(tcp[12] >> 4) * 4;
    let flags = TcpFlags::from_bits(tcp[13]);
    if data_offset < TCP_MIN_HEADER_LEN || data_offset > tcp.len() {
        return Err(TransportError::malformed(
            "tcp",
            format!("data offset {data_offset} with {} bytes", tcp.len()),
        ));
    }

    Ok(Some(Packet {
        flow: FlowKey::new(
            SocketAddr::new(l3.src, src_port),
            SocketAddr::new(l3.dst, dst_port),
        ),
        seq,
        flags,
        payload: frame.slice(tcp_start + data_offset..tcp_end),
        ts,
    }))
}

#[derive(Debug, Clone, Copy)]
enum IpVersion {
    V4,
    V6,
}

struct L3 {
    src: IpAddr,
    dst: IpAddr,
    /// Offset of the TCP header from the start of the IP header.
    header_len: usize,
    /// IP header plus payload, excluding link padding.
    total_len: usize,
}

/// Locates the IP header behind the link header.
fn link_payload(link_type: LinkType, data: &[u8]) -> Result<Option<(IpVersion, usize)>> {
    match link_type {
        LinkType::Ethernet => {
            if data.len() < ETHERNET_HEADER_LEN {
                return Err(TransportError::malformed("ethernet", "truncated header"));
            }
            let mut offset = 12;
            let mut ethertype = u16::from_be_bytes([data[offset], data[offset + 1]]);
            if ethertype == ETHERTYPE_VLAN {
                if data.len() < ETHERNET_HEADER_LEN + 4 {
                    return Err(TransportError::malformed("ethernet", "truncated VLAN tag"));
                }
                offset += 4;
                ethertype = u16::from_be_bytes([data[offset], data[offset + 1]]);
            }
            Ok(ethertype_version(ethertype).map(|v| (v, offset + 2)))
        }
        LinkType::LinuxSll => {
            if data.len() < SLL_HEADER_LEN {
                return Err(TransportError::malformed("sll", "truncated header"));
            }
            let protocol = u16::from_be_bytes([data[14], data[15]]);
            Ok(ethertype_version(protocol).map(|v| (v, SLL_HEADER_LEN)))
        }
        LinkType::Null => {
            if data.len() < NULL_HEADER_LEN {
                return Err(TransportError::malformed("loopback", "truncated header"));
            }
            // Host byte order of the capturing machine; accept either.
            let le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            let be = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            let version = match (le, be) {
                (2, _) | (_, 2) => Some(IpVersion::V4),
                (24 | 28 | 30, _) | (_, 24 | 28 | 30) => Some(IpVersion::V6),
                _ => None,
            };
            Ok(version.map(|v| (v, NULL_HEADER_LEN)))
        }
        LinkType::Raw => match data.first().map(|b| b >> 4) {
            Some(4) => Ok(Some((IpVersion::V4, 0))),
            Some(6) => Ok(Some((IpVersion::V6, 0))),
            Some(_) => Ok(None),
            None => Err(TransportError::malformed("raw", "empty frame")),
        },
    }
}

const fn ethertype_version(ethertype: u16) -> Option<IpVersion> {
    match ethertype {
        ETHERTYPE_IPV4 => Some(IpVersion::V4),
        ETHERTYPE_IPV6 => Some(IpVersion::V6),
        _ => None,
    }
}

fn parse_ipv4(ip: &[u8]) -> Result<Option<L3>> {
    if ip.len() < IPV4_MIN_HEADER_LEN {
        return Err(TransportError::malformed("ipv4", "truncated header"));
    }
    if ip[0] >> 4 != 4 {
        return Err(TransportError::malformed("ipv4", format!("version {}", ip[0] >> 4)));
    }
    let header_len = usize::from(ip[0] & 0x0F) * 4;
    let total_len = usize::from(u16::from_be_bytes([ip[2], ip[3]]));
    if header_len < IPV4_MIN_HEADER_LEN || total_len < header_len || total_len > ip.len() {
        return Err(TransportError::malformed(
            "ipv4",
            format!(
                "header {header_len}, total {total_len}, captured {}",
                ip.len()
            ),
        ));
    }
    let frag = u16::from_be_bytes([ip[6], ip[7]]);
    let more_fragments = frag & 0x2000 != 0;
    let frag_offset = frag & 0x1FFF;
    if more_fragments || frag_offset != 0 || ip[9] != IPPROTO_TCP {
        return Ok(None);
    }
    Ok(Some(L3 {
        src: IpAddr::V4(Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15])),
        dst: IpAddr::V4(Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19])),
        header_len,
        total_len,
    }))
}

fn parse_ipv6(ip: &[u8]) -> Result<Option<L3>> {
    if ip.len() < IPV6_HEADER_LEN {
        return Err(TransportError::malformed("ipv6", "truncated header"));
    }
    let payload_len = usize::from(u16::from_be_bytes([ip[4], ip[5]]));
    let total_len = IPV6_HEADER_LEN + payload_len;
    if total_len > ip.len() {
        return Err(TransportError::malformed(
            "ipv6",
            format!("payload {payload_len} exceeds captured {}", ip.len()),
        ));
    }

    let mut next = ip[6];
    let mut header_len = IPV6_HEADER_LEN;
    loop {
        match next {
            IPPROTO_TCP => break,
            IPV6_HOP_BY_HOP | IPV6_ROUTING | IPV6_DEST_OPTS => {
                if header_len + 2 > total_len {
                    return Err(TransportError::malformed("ipv6", "truncated extension"));
                }
                next = ip[header_len];
                header_len += (usize::from(ip[header_len + 1]) + 1) * 8;
            }
            // Fragments and non-TCP payloads.
            _ => return Ok(None),
        }
    }
    if header_len > total_len {
        return Err(TransportError::malformed("ipv6", "extension past payload"));
    }

    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&ip[8..24]);
    dst.copy_from_slice(&ip[24..40]);
    Ok(Some(L3 {
        src: IpAddr::V6(Ipv6Addr::from(src)),
        dst: IpAddr::V6(Ipv6Addr::from(dst)),
        header_len,
        total_len,
    }))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{ipv6_tcp_frame, tcp_frame};

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_ethernet_ipv4() {
        let frame = Bytes::from(tcp_frame(
            addr("10.0.0.1:50000"),
            addr("10.0.0.2:27017"),
            1000,
            TcpFlags::ACK | TcpFlags::PSH,
            b"hello",
        ));
        let ts = CaptureTime::from_secs_micros(10, 0);
        let packet = parse_frame(LinkType::Ethernet, &frame, ts).unwrap().unwrap();
        assert_eq!(packet.flow.src, addr("10.0.0.1:50000"));
        assert_eq!(packet.flow.dst, addr("10.0.0.2:27017"));
        assert_eq!(packet.seq, 1000);
        assert!(packet.flags.ack());
        assert!(!packet.flags.syn());
        assert_eq!(packet.payload.as_ref(), b"hello");
        assert_eq!(packet.ts, ts);
    }

    #[test]
    fn test_ethernet_padding_is_trimmed() {
        let mut frame = tcp_frame(
            addr("10.0.0.1:1"),
            addr("10.0.0.2:2"),
            1,
            TcpFlags::ACK,
            b"",
        );
        frame.extend_from_slice(&[0u8; 6]);
        let packet = parse_frame(LinkType::Ethernet, &Bytes::from(frame), CaptureTime::ZERO)
            .unwrap()
            .unwrap();
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_parse_ipv6() {
        let frame = Bytes::from(ipv6_tcp_frame(
            addr("[::1]:50000"),
            addr("[::1]:27017"),
            7,
            TcpFlags::SYN,
            b"",
        ));
        let packet = parse_frame(LinkType::Ethernet, &frame, CaptureTime::ZERO)
            .unwrap()
            .unwrap();
        assert!(packet.flags.syn());
        assert_eq!(packet.flow.dst.port(), 27017);
    }

    #[test]
    fn test_raw_and_null_links() {
        let eth = tcp_frame(addr("10.0.0.1:1"), addr("10.0.0.2:2"), 5, TcpFlags::ACK, b"x");
        let ip = Bytes::copy_from_slice(&eth[ETHERNET_HEADER_LEN..]);
        assert!(parse_frame(LinkType::Raw, &ip, CaptureTime::ZERO).unwrap().is_some());

        let mut null = 2u32.to_le_bytes().to_vec();
        null.extend_from_slice(&ip);
        assert!(parse_frame(LinkType::Null, &Bytes::from(null), CaptureTime::ZERO)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_non_tcp_is_skipped() {
        let mut frame = tcp_frame(addr("10.0.0.1:1"), addr("10.0.0.2:2"), 5, TcpFlags::ACK, b"x");
        // Protocol byte of the IPv4 header -> UDP.
        frame[ETHERNET_HEADER_LEN + 9] = 17;
        assert!(parse_frame(LinkType::Ethernet, &Bytes::from(frame), CaptureTime::ZERO)
            .unwrap()
            .is_none());

        let mut arp = vec![0u8; 42];
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert!(parse_frame(LinkType::Ethernet, &Bytes::from(arp), CaptureTime::ZERO)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_truncated_headers_are_errors() {
        let frame = tcp_frame(addr("10.0.0.1:1"), addr("10.0.0.2:2"), 5, TcpFlags::ACK, b"abc");
        let cut = Bytes::copy_from_slice(&frame[..ETHERNET_HEADER_LEN + 30]);
        let err = parse_frame(LinkType::Ethernet, &cut, CaptureTime::ZERO).unwrap_err();
        assert!(err.is_packet_error());

        let short = Bytes::from_static(&[0u8; 8]);
        assert!(parse_frame(LinkType::Ethernet, &short, CaptureTime::ZERO).is_err());
    }

    #[test]
    fn test_link_type_mapping() {
        assert_eq!(LinkType::from_pcap(1), Some(LinkType::Ethernet));
        assert_eq!(LinkType::from_pcap(113), Some(LinkType::LinuxSll));
        assert_eq!(LinkType::from_pcap(105), None);
        assert_eq!(LinkType::Raw.as_pcap(), 101);
    }
}
