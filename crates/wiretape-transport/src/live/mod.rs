// ============================================
// File: crates/wiretape-transport/src/live/mod.rs
// ============================================
//! # Live Connection Module
//!
//! ## Creation Reason
//! Connections from replay sessions to the target server.
//!
//! ## Implementations
//! - `tcp`: Tokio TCP connections
//! - `mock`: In-memory server for tests
//!
//! ## Last Modified
//! v0.1.0 - Initial live module structure

pub mod tcp;

// Mock implementation for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use tcp::{TcpDialer, TcpServerConnection};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockDialer, SentMessage};
