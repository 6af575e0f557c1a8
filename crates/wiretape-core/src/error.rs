// ============================================
// File: crates/wiretape-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines the errors raised while decoding wire-protocol messages and
//! operation-log records.
//!
//! ## Error Categories
//! 1. **Framing Errors**: the declared message length cannot be trusted,
//!    so a byte stream cannot be advanced past the message
//! 2. **Body Errors**: framing is intact but the body does not match its
//!    op code's layout; the message can be skipped by its declared length
//! 3. **Record Errors**: an operation-log record is corrupt
//!
//! ## ⚠️ Important Note for Next Developer
//! - `NeedMoreData` is NOT an error: decoders return `Ok(None)` for it
//! - `is_framing_error()` drives stream resynchronisation in the reassembler
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use wiretape_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for codec and record operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Framing Errors
    // ========================================
    /// Declared message length is smaller than the header itself.
    #[error("Invalid message length: {declared} (minimum {minimum})")]
    InvalidMessageLength {
        /// Length found in the header
        declared: i32,
        /// Smallest valid length
        minimum: usize,
    },

    /// Message exceeds maximum allowed size.
    #[error("Message too large: max {max} bytes, got {actual}")]
    MessageTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Actual size declared
        actual: usize,
    },

    // ========================================
    // Body Errors
    // ========================================
    /// Message is shorter than its layout requires.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length available
        actual: usize,
    },

    /// Message body does not match its op code's layout.
    #[error("Malformed {op} message: {reason}")]
    MalformedMessage {
        /// Op kind being decoded
        op: &'static str,
        /// What's wrong with the message
        reason: String,
    },

    /// Embedded document has an impossible length prefix.
    #[error("Invalid document: length {length} with {available} bytes available")]
    InvalidDocument {
        /// Length prefix of the document
        length: i32,
        /// Bytes left in the message body
        available: usize,
    },

    // ========================================
    // Record Errors
    // ========================================
    /// Operation-log record has an unknown format version.
    #[error("Unsupported record version: {got}, expected {expected}")]
    UnsupportedRecordVersion {
        /// Version found
        got: u8,
        /// Version supported
        expected: u8,
    },

    /// Operation-log record is corrupt.
    #[error("Malformed record: {reason}")]
    MalformedRecord {
        /// What's wrong with the record
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================
    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `MalformedMessage` error.
    pub fn malformed(op: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            op,
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates a `MalformedRecord` error.
    pub fn malformed_record(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the message length itself is untrustworthy.
    ///
    /// A stream hitting a framing error must resynchronise instead of
    /// skipping the declared length.
    #[must_use]
    pub const fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessageLength { .. } | Self::MessageTooLarge { .. }
        )
    }

    /// Returns `true` if this is a wire-protocol error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessageLength { .. }
                | Self::MessageTooLarge { .. }
                | Self::MessageTooShort { .. }
                | Self::MalformedMessage { .. }
                | Self::InvalidDocument { .. }
        )
    }

    /// Returns `true` if this is an operation-log record error.
    #[must_use]
    pub const fn is_record_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedRecordVersion { .. } | Self::MalformedRecord { .. }
        )
    }
}

// ============================================
// Tests
// ============================================
