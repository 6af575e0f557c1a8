// ============================================
// File: crates/wiretape-transport/src/live/tcp.rs
// ============================================
//! # TCP Server Connection
//!
//! ## Creation Reason
//! Connects replay sessions to the real target server over TCP, wrapping
//! Tokio's `TcpStream` with the `Dialer` / `ServerConnection` traits.
//!
//! ## Main Functionality
//! - `TcpDialer`: Resolves and connects with a timeout
//! - `TcpServerConnection`: Writes encoded messages, reads framed replies
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nagle is disabled; replayed ops should leave immediately
//! - Replies are framed with the codec's length check, never by read size
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP connection implementation

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use wiretape_common::ConnectionId;
use wiretape_core::protocol::{Op, WireCodec};

use crate::error::{Result, TransportError};
use crate::traits::{Dialer, ServerConnection};

// ============================================
// TcpDialer
// ============================================

/// Opens TCP connections to the replay target.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    target: String,
    connect_timeout: Duration,
    codec: WireCodec,
}

impl TcpDialer {
    /// Creates a dialer for `target` (`host:port`).
    #[must_use]
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            target: target.into(),
            connect_timeout,
            codec: WireCodec::new(),
        }
    }

    /// Overrides the largest reply accepted from the server.
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.codec = WireCodec::with_max_message_size(max);
        self
    }

    /// Connects once to check the target is reachable.
    ///
    /// # Errors
    /// Returns `ConnectFailed` or `Timeout`.
    pub async fn check_reachable(&self) -> Result<SocketAddr> {
        let stream = self.connect().await?;
        stream
            .peer_addr()
            .map_err(|e| TransportError::io("reading peer address", e))
    }

    async fn connect(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.target))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: format!("connect to {}", self.target),
            })?
            .map_err(|e| TransportError::connect_failed(&self.target, e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::io("setting TCP_NODELAY", e))?;
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, connection: ConnectionId) -> Result<Box<dyn ServerConnection>> {
        let stream = self.connect().await?;
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::io("reading peer address", e))?;
        debug!(%connection, %peer, "Opened live connection");
        Ok(Box::new(TcpServerConnection {
            stream,
            peer,
            codec: self.codec.clone(),
            read_buf: BytesMut::with_capacity(16 * 1024),
        }))
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

// ============================================
// TcpServerConnection
// ============================================

/// One live TCP connection owned by a replay session.
#[derive(Debug)]
pub struct TcpServerConnection {
    stream: TcpStream,
    peer: SocketAddr,
    codec: WireCodec,
    read_buf: BytesMut,
}

#[async_trait]
impl ServerConnection for TcpServerConnection {
    async fn send(&mut self, message: Bytes) -> Result<()> {
        trace!(peer = %self.peer, len = message.len(), "Sending message");
        self.stream
            .write_all(&message)
            .await
            .map_err(|e| TransportError::SendFailed {
                dest: self.peer,
                reason: e.to_string(),
            })
    }

    async fn read_reply(&mut self) -> Result<Op> {
        loop {
            if let Some(len) = self.codec.check_complete(&self.read_buf)? {
                let frame = self.read_buf.split_to(len).freeze();
                return Ok(self.codec.decode_frame(frame)?);
            }
            let n = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| TransportError::ReceiveFailed {
                    reason: e.to_string(),
                })?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

// ============================================
// Tests
// ============================================
