// ============================================
// File: crates/wiretape-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for the two I/O edges of wiretape: reading
//! captured frames and talking to a live target server.
//!
//! ## Error Categories
//! 1. **Capture Errors**: unreadable capture files, unsupported link types
//! 2. **Packet Errors**: truncated or malformed IP/TCP headers (recoverable)
//! 3. **Connection Errors**: dial, send and receive failures
//! 4. **System Errors**: I/O with context
//!
//! ## ⚠️ Important Note for Next Developer
//! - Packet errors are counted and dropped by the reassembler, never fatal
//! - Capture errors at open time are fatal setup failures
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use wiretape_common::error::CommonError;
use wiretape_core::error::CoreError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Capture Errors
    // ========================================
    /// Capture file is not a readable pcap file.
    #[error("Invalid capture file: {reason}")]
    InvalidCaptureFile {
        /// What's wrong with the file
        reason: String,
    },

    /// Link-layer type is not supported.
    #[error("Unsupported link type {0}")]
    UnsupportedLinkType(u32),

    /// Capture mode is not available in this build.
    #[error("Unsupported capture source: {what}")]
    UnsupportedSource {
        /// Description of the requested source
        what: String,
    },

    // ========================================
    // Packet Errors
    // ========================================
    /// Frame could not be parsed at the given layer.
    #[error("Malformed {layer} header: {reason}")]
    MalformedPacket {
        /// Protocol layer that failed (ethernet, ipv4, tcp, ...)
        layer: &'static str,
        /// Why parsing failed
        reason: String,
    },

    // ========================================
    // Connection Errors
    // ========================================
    /// Could not connect to the target server.
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Target address
        addr: String,
        /// Why connecting failed
        reason: String,
    },

    /// Send operation failed.
    #[error("Failed to send to {dest}: {reason}")]
    SendFailed {
        /// Destination address
        dest: SocketAddr,
        /// Why send failed
        reason: String,
    },

    /// Receive operation failed.
    #[error("Failed to receive: {reason}")]
    ReceiveFailed {
        /// Why receive failed
        reason: String,
    },

    /// Peer closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// What operation timed out
        operation: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================
    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error decoding a live reply.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidCaptureFile` error.
    pub fn invalid_capture(reason: impl Into<String>) -> Self {
        Self::InvalidCaptureFile {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedPacket` error.
    pub fn malformed(layer: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            layer,
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::SendFailed { .. } | Self::ReceiveFailed { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns `true` if a single captured frame was unusable.
    #[must_use]
    pub const fn is_packet_error(&self) -> bool {
        matches!(self, Self::MalformedPacket { .. })
    }

    /// Returns `true` if this is a live-connection error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::SendFailed { .. }
                | Self::ReceiveFailed { .. }
                | Self::ConnectionClosed
                | Self::Timeout { .. }
        )
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================
