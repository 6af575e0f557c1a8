// ============================================
// File: crates/wiretape/src/error.rs
// ============================================
//! # Replay Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use wiretape_common::error::CommonError;
use wiretape_core::error::CoreError;
use wiretape_transport::error::TransportError;

/// Result type for capture and playback runs.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Errors surfaced by capture and playback runs.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Failed to open operation log '{path}': {source}")]
    LogOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt operation log record at byte {offset}: {source}")]
    CorruptLog {
        offset: u64,
        #[source]
        source: CoreError,
    },

    #[error("Target {target} unreachable: {reason}")]
    TargetUnreachable {
        target: String,
        reason: String,
    },

    #[error("Run failed to start: {reason}")]
    StartupFailed {
        reason: String,
    },

    #[error("Background task failed: {reason}")]
    TaskFailed {
        reason: String,
    },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplayError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptLog { .. })
    }

    /// Errors that abort the whole run rather than one connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::LogOpen { .. }
                | Self::CorruptLog { .. }
                | Self::TargetUnreachable { .. }
                | Self::StartupFailed { .. }
        )
    }
}
