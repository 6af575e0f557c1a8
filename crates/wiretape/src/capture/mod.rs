// ============================================
// File: crates/wiretape/src/capture/mod.rs
// ============================================
//! # Capture Pipeline
//!
//! ## Creation Reason
//! Turns captured TCP segments into a time-ordered operation log.
//!
//! ## Main Functionality
//! - [`reassembly`]: Per-connection, per-direction TCP stream rebuilding
//! - [`stream_decoder`]: Message framing over a rebuilt stream
//! - [`ordered`]: Capture-time merge across connections
//! - [`recorder`]: End-to-end capture run
//!
//! ## Last Modified
//! v0.1.0 - Initial capture pipeline

pub mod ordered;
pub mod reassembly;
pub mod recorder;
pub mod stream_decoder;

pub use ordered::OrderedOps;
pub use reassembly::{Reassembler, ReassemblerConfig, ReassemblyBuffer, ReassemblyStats};
pub use recorder::{CaptureSummary, Recorder};
pub use stream_decoder::StreamDecoder;

pub use crate::config::OverflowPolicy;
