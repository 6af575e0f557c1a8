// ============================================
// File: crates/wiretape-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identity types used to tie captured bytes, decoded
//! operations and replay sessions to one logical TCP connection.
//!
//! ## Main Functionality
//! - `FlowKey`: One direction of a TCP flow (source → destination)
//! - `ConnectionKey`: Canonical, direction-independent 4-tuple
//! - `ConnectionId`: Compact identifier assigned at capture time
//!
//! ## Main Logical Flow
//! 1. Packets carry a `FlowKey`
//! 2. The reassembler canonicalizes it into a `ConnectionKey`
//! 3. Each new `ConnectionKey` gets the next `ConnectionId`
//! 4. Playback routes every operation by `ConnectionId`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both directions of a flow MUST map to the same `ConnectionKey`
//! - `ConnectionId` is serialized as a bare integer
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// ConnectionId
// ============================================

/// Identifier of one captured TCP connection.
///
/// Assigned sequentially by the reassembler in order of first sight and
/// persisted with every recorded operation.
///
/// # Example
/// ```
/// use wiretape_common::types::ConnectionId;
///
/// let id = ConnectionId::new(7);
/// assert_eq!(id.to_string(), "conn-7");
/// assert_eq!("conn-7".parse::<ConnectionId>().unwrap(), id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a connection id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("conn-").unwrap_or(s);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|e| CommonError::invalid_input("connection_id", e.to_string()))
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================
// FlowKey
// ============================================

/// One direction of a TCP flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    /// Sending endpoint.
    pub src: SocketAddr,
    /// Receiving endpoint.
    pub dst: SocketAddr,
}

impl FlowKey {
    /// Creates a flow key.
    #[must_use]
    pub const fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self { src, dst }
    }

    /// Returns the opposite direction of this flow.
    #[must_use]
    pub const fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }

    /// Returns the direction-independent key of the connection.
    #[must_use]
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey::from_flow(*self)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

// ============================================
// ConnectionKey
// ============================================

/// Canonical bidirectional 4-tuple.
///
/// The lower endpoint (by address, then port) is always stored first, so
/// `A→B` and `B→A` produce equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    low: SocketAddr,
    high: SocketAddr,
}

impl ConnectionKey {
    /// Canonicalizes a flow.
    #[must_use]
    pub fn from_flow(flow: FlowKey) -> Self {
        if flow.src <= flow.dst {
            Self {
                low: flow.src,
                high: flow.dst,
            }
        } else {
            Self {
                low: flow.dst,
                high: flow.src,
            }
        }
    }

    /// Returns `true` if `flow` travels from the low endpoint to the high one.
    #[must_use]
    pub fn is_forward(&self, flow: &FlowKey) -> bool {
        flow.src == self.low && flow.dst == self.high
    }

    /// Returns the two endpoints in canonical order.
    #[must_use]
    pub const fn endpoints(&self) -> (SocketAddr, SocketAddr) {
        (self.low, self.high)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}

// ============================================
// Tests
// ============================================
