// ============================================
// File: crates/wiretape-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the seams between wiretape's core pipeline and the outside
//! world, so capture and playback can be driven by in-memory
//! implementations in tests.
//!
//! ## Main Functionality
//! - `PacketSource`: Yields timestamped link-layer frames
//! - `Dialer`: Opens one live connection per replayed session
//! - `ServerConnection`: Sends encoded ops and reads replies
//!
//! ## ⚠️ Important Note for Next Developer
//! - All trait methods are async via `async_trait`
//! - `ServerConnection` is owned by exactly one session task
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use wiretape_common::{CaptureTime, ConnectionId};
use wiretape_core::protocol::Op;

use crate::capture::frame::LinkType;
use crate::error::Result;

// ============================================
// RawFrame
// ============================================

/// One captured link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Link-layer type of `data`.
    pub link_type: LinkType,
    /// Captured bytes (possibly shorter than on the wire).
    pub data: Bytes,
    /// Capture timestamp.
    pub ts: CaptureTime,
    /// Original length on the wire.
    pub orig_len: u32,
}

// ============================================
// PacketSource Trait
// ============================================

/// Source of captured frames in capture order.
///
/// # Example
/// ```ignore
/// while let Some(frame) = source.next_packet().await? {
///     match parse_frame(frame.link_type, &frame.data, frame.ts) { ... }
/// }
/// ```
#[async_trait]
pub trait PacketSource: Send {
    /// Returns the next frame, or `None` at the end of the capture.
    ///
    /// # Errors
    /// Returns error if the underlying source fails.
    async fn next_packet(&mut self) -> Result<Option<RawFrame>>;

    /// Short description used in logs.
    fn describe(&self) -> String;
}

// ============================================
// ServerConnection Trait
// ============================================

/// Live connection to the replay target.
#[async_trait]
pub trait ServerConnection: Send {
    /// Writes one encoded wire message.
    ///
    /// # Errors
    /// Returns error if the write fails.
    async fn send(&mut self, message: Bytes) -> Result<()>;

    /// Reads the next reply message.
    ///
    /// # Errors
    /// Returns error if the read fails or the reply cannot be decoded.
    async fn read_reply(&mut self) -> Result<Op>;

    /// Address of the server.
    fn peer_addr(&self) -> SocketAddr;
}

// ============================================
// Dialer Trait
// ============================================

/// Factory for live connections, one per replayed session.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Opens a connection for the given captured connection.
    ///
    /// # Errors
    /// Returns error if the target cannot be reached.
    async fn dial(&self, connection: ConnectionId) -> Result<Box<dyn ServerConnection>>;

    /// Description of the target used in logs.
    fn target(&self) -> String;
}
