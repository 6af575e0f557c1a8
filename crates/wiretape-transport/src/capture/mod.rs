// ============================================
// File: crates/wiretape-transport/src/capture/mod.rs
// ============================================
//! # Capture Module
//!
//! ## Creation Reason
//! Supplies timestamped frames to the reassembler and knows how to strip
//! link, IP and TCP headers from them.
//!
//! ## Implementations
//! - `pcap`: Classic libpcap files
//! - `mock`: Synthetic frames and in-memory sources for tests
//!
//! ## ⚠️ Important Note for Next Developer
//! - Live interface capture is not built in; record with tcpdump and
//!   feed the file instead
//!
//! ## Last Modified
//! v0.1.0 - Initial capture module structure

pub mod frame;
pub mod pcap;

// Mock implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use frame::{parse_frame, LinkType, Packet, TcpFlags};
pub use pcap::PcapFileSource;

#[cfg(any(test, feature = "mock"))]
pub use mock::MemorySource;
