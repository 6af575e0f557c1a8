// ============================================
// File: crates/wiretape-common/src/time.rs
// ============================================
//! # Capture Time
//!
//! ## Creation Reason
//! Capture timestamps come from the packet source (pcap record headers),
//! not from the local clock. They need nanosecond precision, cheap copies
//! and a stable on-disk form for the operation log.
//!
//! ## Main Functionality
//! - `CaptureTime`: Nanoseconds since the Unix epoch
//! - Saturating arithmetic used by the playback scheduler
//!
//! ## ⚠️ Important Note for Next Developer
//! - A zero `CaptureTime` means "unknown" and is never used as a playback anchor
//! - `i64` nanoseconds overflow in the year 2262
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MICRO: i64 = 1_000;

// ============================================
// CaptureTime
// ============================================

/// Point in time at which bytes were seen on the wire.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use wiretape_common::time::CaptureTime;
///
/// let t0 = CaptureTime::from_secs_micros(1_700_000_000, 0);
/// let t1 = t0 + Duration::from_millis(250);
/// assert_eq!(t1.saturating_duration_since(t0), Duration::from_millis(250));
/// assert_eq!(t0.saturating_duration_since(t1), Duration::ZERO);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureTime(i64);

impl CaptureTime {
    /// The unknown / unset timestamp.
    pub const ZERO: Self = Self(0);

    /// Creates a capture time from nanoseconds since the epoch.
    #[must_use]
    pub const fn from_unix_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a capture time from a pcap-style seconds + microseconds pair.
    #[must_use]
    pub const fn from_secs_micros(secs: u32, micros: u32) -> Self {
        Self(secs as i64 * NANOS_PER_SEC + micros as i64 * NANOS_PER_MICRO)
    }

    /// Creates a capture time from a seconds + nanoseconds pair.
    #[must_use]
    pub const fn from_secs_nanos(secs: u32, nanos: u32) -> Self {
        Self(secs as i64 * NANOS_PER_SEC + nanos as i64)
    }

    /// Converts a `SystemTime`.
    ///
    /// # Errors
    /// Returns `TimestampOutOfRange` for times before the Unix epoch or past 2262.
    pub fn from_system_time(time: SystemTime) -> Result<Self> {
        let since = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| CommonError::timestamp_out_of_range("before epoch"))?;
        i64::try_from(since.as_nanos())
            .map(Self)
            .map_err(|_| CommonError::timestamp_out_of_range(format!("{}s", since.as_secs())))
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    /// Returns nanoseconds since the epoch.
    #[must_use]
    pub const fn as_unix_nanos(&self) -> i64 {
        self.0
    }

    /// Returns `true` for the unset timestamp.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    #[must_use]
    pub fn saturating_duration_since(&self, earlier: Self) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        u64::try_from(delta).map_or(Duration::ZERO, Duration::from_nanos)
    }

    /// Adds a duration, saturating at the representable maximum.
    #[must_use]
    pub fn saturating_add(&self, d: Duration) -> Self {
        let nanos = i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl std::ops::Add<Duration> for CaptureTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        self.saturating_add(rhs)
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.div_euclid(NANOS_PER_SEC);
        let nanos = self.0.rem_euclid(NANOS_PER_SEC);
        write!(f, "{secs}.{nanos:09}")
    }
}

// ============================================
// Tests
// ============================================
