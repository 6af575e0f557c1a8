// ============================================
// File: crates/wiretape-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Errors raised while building the shared identifiers and timestamps,
//! wrapped by every other wiretape crate.
//!
//! ## Main Functionality
//! - `CommonError`: identifier parsing and timestamp range failures
//! - `Result<T>`: Type alias using `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Crate-specific errors wrap this type via `#[from]`
//! - Decoding errors belong in `wiretape-core`, not here
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

/// Common result type.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors from the shared wiretape types.
///
/// # Example
/// ```
/// use wiretape_common::{CommonError, ConnectionId};
///
/// let err = "conn-x".parse::<ConnectionId>().unwrap_err();
/// assert!(matches!(err, CommonError::InvalidInput { .. }));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// A value could not be parsed into a wiretape type.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    /// A wall-clock time cannot be expressed as nanoseconds since the epoch.
    #[error("Timestamp out of range: {detail} (representable years are 1970 to 2262)")]
    TimestampOutOfRange {
        /// The offending value
        detail: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `TimestampOutOfRange` error.
    pub fn timestamp_out_of_range(detail: impl Into<String>) -> Self {
        Self::TimestampOutOfRange {
            detail: detail.into(),
        }
    }

    /// Returns `true` if this error was caused by bad input.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}
