// ============================================
// File: crates/wiretape-core/src/oplog/mod.rs
// ============================================
//! # Operation Log Module
//!
//! ## Creation Reason
//! Defines the persisted record format shared by the capture writer and
//! the playback reader. File I/O lives in the `wiretape` crate; this
//! module is pure encoding.
//!
//! ## Main Functionality
//! - [`record`]: `OpWithTime` and its self-delimiting `RecordCodec`
//!
//! ## File Layout
//! A log is a flat concatenation of records with no index and no footer.
//! Readers scan forward only.
//!
//! ## Last Modified
//! v0.1.0 - Initial record format

pub mod record;

pub use record::{
    OpWithTime, RecordCodec, MAX_RECORD_SIZE, MIN_RECORD_SIZE, RECORD_FORMAT_VERSION,
};
