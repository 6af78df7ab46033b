// gateway-providers/src/ratelimit.rs
// ============================================================================
// Module: Rate Limiter
// Description: C8 — per-(integration, tenant) sliding-window rate limiting.
// Purpose: Apply RateLimitWindow::check_and_increment atomically in-process.
// Dependencies: gateway-core, dashmap
// ============================================================================

//! ## Overview
//! The sliding-window math itself lives in `gateway_core::core::ratelimit`;
//! this module supplies the concurrent, atomic storage for it. `DashMap`'s
//! per-shard locking means `entry(key).or_insert_with(..)` followed by the
//! mutation happens under one shard lock, giving `checkAndIncrement`'s
//! atomicity without a separate mutex registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dashmap::DashMap;
use gateway_core::core::IntegrationId;
use gateway_core::core::RateLimitDecision;
use gateway_core::core::RateLimitWindow;
use gateway_core::core::TenantId;
use gateway_core::core::Timestamp;

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

/// Key identifying one rate-limit window.
pub type RateLimitKey = (IntegrationId, TenantId);

/// In-process sliding-window rate limiter keyed by `(integrationId, tenantId)`.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<RateLimitKey, RateLimitWindow>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    /// Applies one `checkAndIncrement` for `key`, creating a fresh window on
    /// first use.
    pub fn check_and_increment(
        &self,
        key: RateLimitKey,
        now: Timestamp,
        max_requests: u32,
        window_seconds: u32,
    ) -> RateLimitDecision {
        let mut entry = self
            .windows
            .entry(key)
            .or_insert_with(|| RateLimitWindow::new(now, window_seconds));
        entry.check_and_increment(now, max_requests, window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RateLimitKey {
        (IntegrationId::new("int-1"), TenantId::new("tenant-1"))
    }

    #[test]
    fn allows_up_to_cap_then_denies() {
        let limiter = RateLimiter::new();
        let now = Timestamp::from_millis(0);
        for _ in 0..3 {
            let decision = limiter.check_and_increment(key(), now, 3, 60);
            assert!(decision.allowed);
        }
        let decision = limiter.check_and_increment(key(), now, 3, 60);
        assert!(!decision.allowed);
        assert!(decision.retry_after_seconds.is_some());
    }

    #[test]
    fn separate_keys_have_independent_windows() {
        let limiter = RateLimiter::new();
        let now = Timestamp::from_millis(0);
        let other_key = (IntegrationId::new("int-2"), TenantId::new("tenant-1"));
        assert!(limiter.check_and_increment(key(), now, 1, 60).allowed);
        assert!(!limiter.check_and_increment(key(), now, 1, 60).allowed);
        assert!(limiter.check_and_increment(other_key, now, 1, 60).allowed);
    }

    #[test]
    fn window_resets_after_rollover() {
        let limiter = RateLimiter::new();
        assert!(limiter.check_and_increment(key(), Timestamp::from_millis(0), 1, 60).allowed);
        assert!(!limiter.check_and_increment(key(), Timestamp::from_millis(1_000), 1, 60).allowed);
        assert!(limiter.check_and_increment(key(), Timestamp::from_millis(61_000), 1, 60).allowed);
    }
}
