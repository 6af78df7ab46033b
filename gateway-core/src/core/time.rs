// gateway-core/src/core/time.rs
// ============================================================================
// Module: Gateway Time Model
// Description: Canonical timestamp representation for audit, log, and schedule records.
// Purpose: Provide a single wall-clock time type shared across all collaborators.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The gateway is a real-time delivery engine: rate-limit windows, retry
//! backoff, and scheduled deliveries all reason about wall-clock instants.
//! [`Timestamp`] wraps Unix milliseconds so every record serializes to a
//! plain integer on the wire while supporting `time::OffsetDateTime`
//! arithmetic internally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::ops::Add;
use std::ops::Sub;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Wall-clock instant expressed as Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_millis(
            (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
        )
    }

    /// Wraps a raw Unix-millis value.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Wraps a raw Unix-seconds value.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds * 1000)
    }

    /// Returns the value as Unix milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the value as Unix seconds, truncated toward zero.
    #[must_use]
    pub const fn as_unix_seconds(&self) -> i64 {
        self.0 / 1000
    }

    /// Returns the absolute difference between two timestamps, in milliseconds.
    #[must_use]
    pub const fn abs_diff_millis(&self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Returns a new timestamp offset by the given duration.
    #[must_use]
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.plus(rhs)
    }
}

impl Sub for Timestamp {
    type Output = i64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn round_trips_millis() {
        let ts = Timestamp::from_millis(1_700_000_000_000);
        assert_eq!(ts.as_millis(), 1_700_000_000_000);
        assert_eq!(ts.as_unix_seconds(), 1_700_000_000);
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(2_500);
        assert_eq!(a.abs_diff_millis(b), 1_500);
        assert_eq!(b.abs_diff_millis(a), 1_500);
    }
}
