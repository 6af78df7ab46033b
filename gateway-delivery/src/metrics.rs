// gateway-delivery/src/metrics.rs
// ============================================================================
// Module: Gateway Metrics
// Description: The counter surface watchdog/workers report through.
// Purpose: Decouple worker internals from any particular metrics backend.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! No metrics backend is wired into the workspace dependency set, so
//! `GatewayMetrics` is the seam a concrete exporter (Prometheus, StatsD,
//! whatever the deployment wants) attaches to later. [`TracingMetrics`] is the
//! default: every increment becomes a structured `tracing` event, which is
//! enough to drive alerting off log aggregation until a real backend lands.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Counters the delivery workers report against.
pub trait GatewayMetrics: Send + Sync {
    /// An event audit row was found stuck in `PROCESSING` past the threshold.
    fn stuck_event_detected(&self, tenant_id: &str);
    /// A source adapter detected a non-contiguous offset gap.
    fn source_gap_detected(&self, source: &str, expected: i64, actual: i64);
    /// One delivery attempt completed (outbound, inbound, retry, or scheduled).
    fn delivery_attempted(&self, integration_id: &str, outcome: &str);
    /// A DLQ entry was abandoned after exhausting its retry budget.
    fn dlq_abandoned(&self, integration_id: &str);
}

/// Reports every counter as a `tracing` event at the appropriate level.
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl GatewayMetrics for TracingMetrics {
    fn stuck_event_detected(&self, tenant_id: &str) {
        tracing::warn!(metric = "stuck_events_total", tenant_id, "event audit stuck past threshold");
    }

    fn source_gap_detected(&self, source: &str, expected: i64, actual: i64) {
        tracing::warn!(metric = "gap_detected_total", source, expected, actual, "source offset gap detected");
    }

    fn delivery_attempted(&self, integration_id: &str, outcome: &str) {
        tracing::info!(metric = "delivery_attempts_total", integration_id, outcome, "delivery attempt completed");
    }

    fn dlq_abandoned(&self, integration_id: &str) {
        tracing::warn!(metric = "dlq_abandoned_total", integration_id, "dlq entry abandoned");
    }
}

/// An in-process counter set, useful for tests that assert on counts rather
/// than on log lines.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    /// Total `stuckEventDetected` calls.
    pub stuck_events: AtomicU64,
    /// Total `sourceGapDetected` calls.
    pub gaps_detected: AtomicU64,
    /// Total `deliveryAttempted` calls.
    pub delivery_attempts: AtomicU64,
    /// Total `dlqAbandoned` calls.
    pub dlq_abandoned: AtomicU64,
}

impl GatewayMetrics for CountingMetrics {
    fn stuck_event_detected(&self, _tenant_id: &str) {
        self.stuck_events.fetch_add(1, Ordering::Relaxed);
    }

    fn source_gap_detected(&self, _source: &str, _expected: i64, _actual: i64) {
        self.gaps_detected.fetch_add(1, Ordering::Relaxed);
    }

    fn delivery_attempted(&self, _integration_id: &str, _outcome: &str) {
        self.delivery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn dlq_abandoned(&self, _integration_id: &str) {
        self.dlq_abandoned.fetch_add(1, Ordering::Relaxed);
    }
}
