// ============================================
// File: crates/wiretape-transport/src/lib.rs
// ============================================
//! # Wiretape Transport - Capture & Live I/O Layer
//!
//! ## Creation Reason
//! Provides the I/O edges of the capture/replay pipeline: reading frames
//! from packet captures on the way in, and talking to a live server on
//! the way out.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `PacketSource`, `Dialer` and `ServerConnection` seams
//! - [`capture`]: pcap reader and Ethernet/IP/TCP header parsing
//! - [`live`]: TCP connections to the replay target
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  wiretape (bin)                     │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   wiretape-core  ◄──── wiretape-transport          │
//! │                        You are here ◄──            │
//! │         │                    │                     │
//! │         └──────────┬─────────┘                     │
//! │                    ▼                               │
//! │            wiretape-common                         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │   pcap file ──► PcapFileSource ──► parse_frame ──► Packet │
//! │                                                   │      │
//! │                                       (reassembly, in    │
//! │                                        the wiretape bin) │
//! │                                                   │      │
//! │   target server ◄── TcpServerConnection ◄── session task │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always use traits for testability
//! - Live interface capture is not built in; use tcpdump + pcap files
//! - Mock implementations available with `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod error;
pub mod live;
pub mod traits;

// Re-export primary types
pub use capture::{parse_frame, LinkType, Packet, PcapFileSource, TcpFlags};
pub use error::{Result, TransportError};
pub use live::TcpDialer;
pub use traits::{Dialer, PacketSource, RawFrame, ServerConnection};
