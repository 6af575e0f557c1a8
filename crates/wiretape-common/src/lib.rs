// ============================================
// File: crates/wiretape-common/src/lib.rs
// ============================================
//! # Wiretape Common - Shared Types Library
//!
//! ## Creation Reason
//! Provides the identifiers and timestamps that every stage of the
//! capture/replay pipeline agrees on, so that the codec, the reassembler
//! and the playback scheduler never disagree about what a "connection"
//! or a "capture time" is.
//!
//! ## Main Functionality
//! - [`types`]: `ConnectionId`, `FlowKey`, `ConnectionKey`
//! - [`time`]: `CaptureTime` (nanosecond capture timestamps)
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  wiretape (bin)                     │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   wiretape-core  ◄──── wiretape-transport          │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │            wiretape-common  ◄── You are here       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal (serde + thiserror only)
//! - `ConnectionId` values are persisted in operation logs; never renumber them
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use time::CaptureTime;
pub use types::{ConnectionId, ConnectionKey, FlowKey};
