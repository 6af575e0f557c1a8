// ============================================
// File: crates/wiretape/src/config.rs
// ============================================
//! # Wiretape Configuration
//!
//! ## Creation Reason
//! Collects the tunables of capture and playback runs in one TOML file,
//! with CLI flags layered on top.
//!
//! ## Main Functionality
//! - `WiretapeConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - CLI override helpers
//!
//! ## Configuration Sections
//! - `capture`: Reassembly bounds, overflow policy, idle timeout
//! - `playback`: Target server, speed, repeat, session queue depth
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [capture]
//! packet_buf_size = 1000
//! overflow_policy = "force_flush"
//! idle_timeout_secs = 5
//!
//! [playback]
//! target = "127.0.0.1:27017"
//! speed = 2.0
//! repeat = 1
//! session_queue_depth = 10000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every field has a default; an empty file is a valid config
//! - Call `validate()` again after applying CLI overrides
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use wiretape_core::protocol::{HEADER_SIZE, MAX_MESSAGE_SIZE};

use crate::error::{ReplayError, Result};

// ============================================
// WiretapeConfig
// ============================================

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WiretapeConfig {
    /// Capture configuration.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Playback configuration.
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WiretapeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ReplayError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ReplayError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ReplayError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        self.playback.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    // ========================================
    // CLI Overrides
    // ========================================

    /// Applies `record` command flags.
    pub fn apply_capture_overrides(&mut self, packet_buf_size: Option<usize>, max_ops: Option<u64>) {
        if let Some(size) = packet_buf_size {
            self.capture.packet_buf_size = size;
        }
        if max_ops.is_some() {
            self.capture.max_ops = max_ops;
        }
    }

    /// Applies `play` command flags.
    pub fn apply_playback_overrides(&mut self, overrides: PlaybackOverrides) {
        let PlaybackOverrides {
            target,
            queue_depth,
            speed,
            repeat,
            max_ops,
            report,
        } = overrides;
        if let Some(target) = target {
            self.playback.target = target;
        }
        if let Some(depth) = queue_depth {
            self.playback.session_queue_depth = depth;
        }
        if let Some(speed) = speed {
            self.playback.speed = speed;
        }
        if let Some(repeat) = repeat {
            self.playback.repeat = repeat;
        }
        if max_ops.is_some() {
            self.playback.max_ops = max_ops;
        }
        if report.is_some() {
            self.playback.report = report;
        }
    }

    /// Applies the CLI verbosity count, if any.
    pub fn apply_verbosity(&mut self, verbose: u8) {
        match verbose {
            0 => {}
            1 => self.logging.level = "debug".into(),
            _ => self.logging.level = "trace".into(),
        }
    }
}

/// CLI values for the `play` command.
#[derive(Debug, Clone, Default)]
pub struct PlaybackOverrides {
    /// `--host`
    pub target: Option<String>,
    /// `--packet-buf-size`
    pub queue_depth: Option<usize>,
    /// `--speed`
    pub speed: Option<f64>,
    /// `--repeat`
    pub repeat: Option<u32>,
    /// `--max-ops`
    pub max_ops: Option<u64>,
    /// `--report`
    pub report: Option<PathBuf>,
}

// ============================================
// CaptureConfig
// ============================================

/// What to do when a direction holds too many out-of-order segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Skip ahead to the lowest pending segment and record a gap.
    #[default]
    ForceFlush,
    /// Discard the segment that would exceed the bound.
    DropNewest,
}

/// Capture configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Max pending out-of-order segments per direction.
    #[serde(default = "default_packet_buf_size")]
    pub packet_buf_size: usize,

    /// Policy applied when `packet_buf_size` is exceeded.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Seconds of capture time after which a silent connection is finalized.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Bound on decoded ops held back for time-ordered output.
    #[serde(default = "default_order_buffer_size")]
    pub order_buffer_size: usize,

    /// Largest wire message accepted.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Stop after writing this many ops.
    #[serde(default)]
    pub max_ops: Option<u64>,
}

fn default_packet_buf_size() -> usize {
    1000
}

fn default_idle_timeout_secs() -> u64 {
    5
}

fn default_order_buffer_size() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    MAX_MESSAGE_SIZE
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if self.packet_buf_size == 0 {
            return Err(ReplayError::config_invalid(
                "capture.packet_buf_size",
                "must be greater than 0",
            ));
        }

        if self.idle_timeout_secs == 0 {
            return Err(ReplayError::config_invalid(
                "capture.idle_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.order_buffer_size == 0 {
            return Err(ReplayError::config_invalid(
                "capture.order_buffer_size",
                "must be greater than 0",
            ));
        }

        if self.max_message_size < HEADER_SIZE || self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(ReplayError::config_invalid(
                "capture.max_message_size",
                format!("must be between {HEADER_SIZE} and {MAX_MESSAGE_SIZE}"),
            ));
        }

        Ok(())
    }

    /// Idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            packet_buf_size: default_packet_buf_size(),
            overflow_policy: OverflowPolicy::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
            order_buffer_size: default_order_buffer_size(),
            max_message_size: default_max_message_size(),
            max_ops: None,
        }
    }
}

// ============================================
// PlaybackConfig
// ============================================

/// Playback configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Target server (`host:port`).
    #[serde(default = "default_target")]
    pub target: String,

    /// Playback speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Number of passes over the log.
    #[serde(default = "default_repeat")]
    pub repeat: u32,

    /// Per-session queue bound; the scheduler waits when it is full.
    #[serde(default = "default_session_queue_depth")]
    pub session_queue_depth: usize,

    /// Connect timeout for live sessions in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Stop after dispatching this many ops.
    #[serde(default)]
    pub max_ops: Option<u64>,

    /// JSON-lines execution report path.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

/// Slowest accepted playback speed.
pub const MIN_SPEED: f64 = 0.001;

fn default_target() -> String {
    "127.0.0.1:27017".to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_repeat() -> u32 {
    1
}

fn default_session_queue_depth() -> usize {
    10_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl PlaybackConfig {
    fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(ReplayError::config_invalid(
                "playback.target",
                "cannot be empty",
            ));
        }

        if !self.speed.is_finite() || self.speed < MIN_SPEED {
            return Err(ReplayError::config_invalid(
                "playback.speed",
                format!("must be a finite number of at least {MIN_SPEED}"),
            ));
        }

        if self.repeat == 0 {
            return Err(ReplayError::config_invalid(
                "playback.repeat",
                "must be at least 1",
            ));
        }

        if self.session_queue_depth == 0 {
            return Err(ReplayError::config_invalid(
                "playback.session_queue_depth",
                "must be greater than 0",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ReplayError::config_invalid(
                "playback.connect_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            speed: default_speed(),
            repeat: default_repeat(),
            session_queue_depth: default_session_queue_depth(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_ops: None,
            report: None,
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================
