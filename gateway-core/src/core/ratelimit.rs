// gateway-core/src/core/ratelimit.rs
// ============================================================================
// Module: Gateway Rate Limit Window
// Description: The sliding-window rate-limit record shared by C8's atomic check.
// Purpose: Give the rate limiter a persistable, CAS-friendly window document.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! One `RateLimitWindow` exists per `(integrationId, tenantId)`. The sliding
//! window resets when the first request after `windowEnd` arrives; within a
//! window, increments are a single atomic read-modify-write performed by the
//! concrete rate limiter implementation (see `gateway-providers::ratelimit`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::IntegrationId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Rate Limit Window
// ============================================================================

/// A sliding rate-limit window for one `(integrationId, tenantId)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// Window start instant.
    pub window_start: Timestamp,
    /// Window end instant; `windowEnd - windowStart = windowSeconds`.
    pub window_end: Timestamp,
    /// Requests counted within the current window.
    pub request_count: u32,
}

/// Outcome of a rate-limit check-and-increment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Requests remaining in the current window after this decision.
    pub remaining: u32,
    /// Instant the current window resets.
    pub reset_at: Timestamp,
    /// Seconds the caller should wait before retrying, when denied.
    pub retry_after_seconds: Option<u32>,
}

impl RateLimitWindow {
    /// Creates a fresh window starting at `now`.
    #[must_use]
    pub fn new(now: Timestamp, window_seconds: u32) -> Self {
        Self {
            window_start: now,
            window_end: now.plus(std::time::Duration::from_secs(u64::from(window_seconds))),
            request_count: 0,
        }
    }

    /// Applies one `checkAndIncrement` operation. Mutates `self` in place and
    /// returns the decision; callers are responsible for persisting the
    /// mutation atomically (a single read-modify-write under a per-key lock
    /// or a CAS on the row version).
    #[must_use]
    pub fn check_and_increment(&mut self, now: Timestamp, max_requests: u32, window_seconds: u32) -> RateLimitDecision {
        if now >= self.window_end {
            self.window_start = now;
            self.window_end = now.plus(std::time::Duration::from_secs(u64::from(window_seconds)));
            self.request_count = 0;
        }
        if self.request_count >= max_requests {
            let retry_after = (self.window_end - now).max(0) / 1000;
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: self.window_end,
                retry_after_seconds: Some(retry_after as u32),
            };
        }
        self.request_count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: max_requests - self.request_count,
            reset_at: self.window_end,
            retry_after_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn window_rolls_over_after_end() {
        let mut window = RateLimitWindow::new(Timestamp::from_millis(0), 60);
        let decision = window.check_and_increment(Timestamp::from_millis(61_000), 5, 60);
        assert!(decision.allowed);
        assert_eq!(window.window_start, Timestamp::from_millis(61_000));
    }

    #[test]
    fn denies_past_cap() {
        let mut window = RateLimitWindow::new(Timestamp::from_millis(0), 60);
        for _ in 0..2 {
            assert!(window.check_and_increment(Timestamp::from_millis(0), 2, 60).allowed);
        }
        let decision = window.check_and_increment(Timestamp::from_millis(0), 2, 60);
        assert!(!decision.allowed);
    }

    proptest! {
        #[test]
        fn never_exceeds_cap_within_one_window(max_requests in 1u32..20, attempts in 1u32..100) {
            let mut window = RateLimitWindow::new(Timestamp::from_millis(0), 60);
            let mut allowed_count = 0u32;
            for i in 0..attempts {
                let now = Timestamp::from_millis(i64::from(i) * 100);
                let decision = window.check_and_increment(now, max_requests, 60);
                if decision.allowed {
                    allowed_count += 1;
                }
            }
            prop_assert!(allowed_count <= max_requests);
        }
    }
}
