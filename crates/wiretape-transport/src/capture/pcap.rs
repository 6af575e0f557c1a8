// ============================================
// File: crates/wiretape-transport/src/capture/pcap.rs
// ============================================
//! # Pcap File Source
//!
//! ## Creation Reason
//! Reads classic libpcap capture files (as written by tcpdump) so traffic
//! captured elsewhere can be turned into an operation log offline.
//!
//! ## Main Functionality
//! - `PcapFileSource`: async `PacketSource` over any `AsyncRead`
//! - Both byte orders, microsecond and nanosecond timestamp variants
//!
//! ## File Format
//! ```text
//! ┌───────────────────────── global header (24 bytes) ─────────────────────────┐
//! │ magic u32 │ major u16 │ minor u16 │ zone i32 │ sigfigs u32 │ snaplen │ link │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ┌──────────── record header (16 bytes) ────────────┬─────────────────────────┐
//! │ ts_sec u32 │ ts_frac u32 │ incl_len u32 │ orig_len │ incl_len frame bytes    │
//! └──────────────────────────────────────────────────┴─────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - pcapng is NOT supported; convert with `editcap -F pcap`
//! - A truncated final record ends the capture normally (tcpdump killed mid-write)
//!
//! ## Last Modified
//! v0.1.0 - Initial pcap reader

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use wiretape_common::CaptureTime;

use crate::capture::frame::LinkType;
use crate::error::{Result, TransportError};
use crate::traits::{PacketSource, RawFrame};

// ============================================
// Constants
// ============================================

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_MICROS_SWAPPED: u32 = 0xd4c3_b2a1;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const MAGIC_NANOS_SWAPPED: u32 = 0x4d3c_b2a1;

const GLOBAL_HEADER_SIZE: usize = 24;
const RECORD_HEADER_SIZE: usize = 16;

/// Largest frame accepted from a record header.
const MAX_FRAME_SIZE: usize = 256 * 1024;

// ============================================
// PcapFileSource
// ============================================

/// Packet source reading a classic pcap stream.
#[derive(Debug)]
pub struct PcapFileSource<R = BufReader<File>> {
    reader: R,
    name: String,
    link_type: LinkType,
    big_endian: bool,
    nanos: bool,
    frames_read: u64,
}

impl PcapFileSource<BufReader<File>> {
    /// Opens a capture file.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or its header is invalid.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| TransportError::io(format!("opening {}", path.display()), e))?;
        Self::from_reader(BufReader::new(file), path.display().to_string()).await
    }
}

impl<R: AsyncRead + Unpin + Send> PcapFileSource<R> {
    /// Reads the global header from `reader`.
    ///
    /// # Errors
    /// `InvalidCaptureFile` for bad magic or short header,
    /// `UnsupportedLinkType` for link types other than Ethernet, loopback,
    /// raw IP and Linux cooked.
    pub async fn from_reader(mut reader: R, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut header = [0u8; GLOBAL_HEADER_SIZE];
        let n = read_full(&mut reader, &mut header).await?;
        if n < GLOBAL_HEADER_SIZE {
            return Err(TransportError::invalid_capture(format!(
                "{name}: {n} byte header, need {GLOBAL_HEADER_SIZE}"
            )));
        }

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let (big_endian, nanos) = match magic {
            MAGIC_MICROS => (false, false),
            MAGIC_MICROS_SWAPPED => (true, false),
            MAGIC_NANOS => (false, true),
            MAGIC_NANOS_SWAPPED => (true, true),
            other => {
                return Err(TransportError::invalid_capture(format!(
                    "{name}: bad magic 0x{other:08x} (pcapng is not supported)"
                )))
            }
        };

        let network = read_u32(&header[20..24], big_endian);
        let link_type =
            LinkType::from_pcap(network).ok_or(TransportError::UnsupportedLinkType(network))?;

        debug!(
            source = %name,
            ?link_type,
            big_endian,
            nanos,
            "Opened pcap capture"
        );

        Ok(Self {
            reader,
            name,
            link_type,
            big_endian,
            nanos,
            frames_read: 0,
        })
    }

    /// Link-layer type declared by the file.
    #[must_use]
    pub const fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Number of frames returned so far.
    #[must_use]
    pub const fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> PacketSource for PcapFileSource<R> {
    async fn next_packet(&mut self) -> Result<Option<RawFrame>> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        let n = read_full(&mut self.reader, &mut header).await?;
        if n == 0 {
            return Ok(None);
        }
        if n < RECORD_HEADER_SIZE {
            warn!(source = %self.name, frames = self.frames_read, "Truncated record header at end of capture");
            return Ok(None);
        }

        let ts_sec = read_u32(&header[0..4], self.big_endian);
        let ts_frac = read_u32(&header[4..8], self.big_endian);
        let incl_len = read_u32(&header[8..12], self.big_endian);
        let orig_len = read_u32(&header[12..16], self.big_endian);

        let len = usize::try_from(incl_len).unwrap_or(usize::MAX);
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::invalid_capture(format!(
                "{}: record {} claims {incl_len} bytes",
                self.name, self.frames_read
            )));
        }

        let mut data = vec![0u8; len];
        let n = read_full(&mut self.reader, &mut data).await?;
        if n < len {
            warn!(source = %self.name, frames = self.frames_read, "Truncated frame at end of capture");
            return Ok(None);
        }

        let ts = if self.nanos {
            CaptureTime::from_secs_nanos(ts_sec, ts_frac)
        } else {
            CaptureTime::from_secs_micros(ts_sec, ts_frac)
        };
        self.frames_read += 1;

        Ok(Some(RawFrame {
            link_type: self.link_type,
            data: Bytes::from(data),
            ts,
            orig_len,
        }))
    }

    fn describe(&self) -> String {
        format!("pcap:{}", self.name)
    }
}

// ============================================
// Helpers
// ============================================

fn read_u32(bytes: &[u8], big_endian: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| TransportError::io("reading capture", e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{pcap_bytes, tcp_frame};
    use crate::capture::frame::TcpFlags;

    fn frame(seq: u32) -> Vec<u8> {
        tcp_frame(
            "10.0.0.1:5000".parse().unwrap(),
            "10.0.0.2:27017".parse().unwrap(),
            seq,
            TcpFlags::ACK,
            b"abc",
        )
    }

    #[tokio::test]
    async fn test_reads_frames_in_order() {
        let t0 = CaptureTime::from_secs_micros(100, 250);
        let t1 = CaptureTime::from_secs_micros(101, 0);
        let bytes = pcap_bytes(&[(t0, frame(1)), (t1, frame(4))]);
        let mut source = PcapFileSource::from_reader(bytes.as_slice(), "mem").await.unwrap();
        assert_eq!(source.link_type(), LinkType::Ethernet);

        let first = source.next_packet().await.unwrap().unwrap();
        assert_eq!(first.ts, t0);
        assert_eq!(first.data.as_ref(), frame(1).as_slice());
        let second = source.next_packet().await.unwrap().unwrap();
        assert_eq!(second.ts, t1);
        assert!(source.next_packet().await.unwrap().is_none());
        assert_eq!(source.frames_read(), 2);
    }

    #[tokio::test]
    async fn test_truncated_tail_ends_capture() {
        let mut bytes = pcap_bytes(&[(CaptureTime::ZERO, frame(1)), (CaptureTime::ZERO, frame(4))]);
        bytes.truncate(bytes.len() - 5);
        let mut source = PcapFileSource::from_reader(bytes.as_slice(), "mem").await.unwrap();
        assert!(source.next_packet().await.unwrap().is_some());
        assert!(source.next_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_big_endian_nanosecond_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_NANOS.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&101u32.to_be_bytes());
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&9u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.push(0x45);

        let mut source = PcapFileSource::from_reader(bytes.as_slice(), "mem").await.unwrap();
        assert_eq!(source.link_type(), LinkType::Raw);
        let frame = source.next_packet().await.unwrap().unwrap();
        assert_eq!(frame.ts, CaptureTime::from_secs_nanos(7, 9));
    }

    #[tokio::test]
    async fn test_rejects_bad_magic_and_link_type() {
        let err = PcapFileSource::from_reader(&[0u8; 24][..], "mem").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidCaptureFile { .. }));

        let mut bytes = pcap_bytes(&[]);
        bytes[20..24].copy_from_slice(&105u32.to_le_bytes());
        let err = PcapFileSource::from_reader(bytes.as_slice(), "mem").await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedLinkType(105)));
    }

    #[tokio::test]
    async fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.pcap");
        std::fs::write(&path, pcap_bytes(&[(CaptureTime::ZERO, frame(1))])).unwrap();
        let mut source = PcapFileSource::open(&path).await.unwrap();
        assert!(source.describe().contains("cap.pcap"));
        assert!(source.next_packet().await.unwrap().is_some());

        assert!(PcapFileSource::open(dir.path().join("missing.pcap")).await.is_err());
    }
}
