// gateway-core/src/core/audit.rs
// ============================================================================
// Module: Gateway Event Audit Ledger
// Description: The per-event audit row and its lifecycle state machine.
// Purpose: Give the source adapters and matcher a CAS-safe ingest/claim record.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! `EventAudit` is the one record that makes exactly-once processing possible
//! against an at-least-once source: ingest always creates `PENDING`, and only
//! a successful compare-and-swap to `PROCESSING` authorizes the matcher to
//! act on the event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EventId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lifecycle State
// ============================================================================

/// Lifecycle state of an [`EventAudit`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    /// Ingested, not yet claimed.
    Pending,
    /// Claimed by the matcher via CAS; in flight.
    Processing,
    /// All matched integrations completed (successfully or not) and the
    /// event required no further action.
    Processed,
    /// No integration matched; the event was intentionally not delivered.
    Skipped,
    /// At least one matched integration failed terminally.
    Failed,
    /// `PROCESSING` exceeded the watchdog threshold with no terminal write.
    Stuck,
}

/// Reason an event was skipped rather than delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCategory {
    /// No active integration matched the event's tenant/event-type.
    NoMatchingIntegration,
    /// Every matching integration's `condition` script denied the event.
    ConditionDenied,
    /// The event's tenant has no configuration at all.
    UnknownTenant,
}

// ============================================================================
// SECTION: Event Audit
// ============================================================================

/// Per-event audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAudit {
    /// Natural key of the source event.
    pub event_id: EventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Normalized event type.
    pub event_type: String,
    /// Instant the gateway received the event.
    pub received_at: Timestamp,
    /// Current lifecycle state.
    pub status: EventStatus,
    /// Instant the event was claimed (CAS to `PROCESSING`).
    pub started_at: Option<Timestamp>,
    /// Instant a terminal state was reached.
    pub finished_at: Option<Timestamp>,
    /// Reason the event was skipped, if `status = SKIPPED`.
    pub skip_category: Option<SkipCategory>,
    /// A size-bounded summary of the payload, always retained.
    pub payload_summary: Value,
    /// The full payload, retained only when within `maxPayloadSize`.
    pub payload_full: Option<Value>,
    /// The source's monotonic checkpoint position for this event.
    pub checkpoint_offset: i64,
    /// Milliseconds between `receivedAt` and the source's own event timestamp, if known.
    pub ingest_latency_ms: Option<i64>,
}

impl EventAudit {
    /// Builds a freshly ingested, `PENDING` audit row.
    #[must_use]
    pub fn ingest(
        event_id: EventId,
        tenant_id: TenantId,
        event_type: String,
        checkpoint_offset: i64,
        payload_summary: Value,
        payload_full: Option<Value>,
        ingest_latency_ms: Option<i64>,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            event_type,
            received_at: Timestamp::now(),
            status: EventStatus::Pending,
            started_at: None,
            finished_at: None,
            skip_category: None,
            payload_summary,
            payload_full,
            checkpoint_offset,
            ingest_latency_ms,
        }
    }

    /// Attempts the CAS transition `PENDING -> PROCESSING`.
    ///
    /// Returns `true` iff the transition was applied; on `false` the row is
    /// left unmodified (already claimed, or not claimable from its current
    /// state).
    #[must_use]
    pub fn try_claim(&mut self) -> bool {
        if self.status != EventStatus::Pending {
            return false;
        }
        self.status = EventStatus::Processing;
        self.started_at = Some(Timestamp::now());
        true
    }

    /// Finalizes the row with a terminal status.
    ///
    /// # Panics
    ///
    /// Panics if `terminal` is not one of `PROCESSED`, `SKIPPED`, or `FAILED`
    /// — callers must route `STUCK` transitions through the watchdog instead.
    pub fn finalize(&mut self, terminal: EventStatus, skip_category: Option<SkipCategory>) {
        assert!(
            matches!(
                terminal,
                EventStatus::Processed | EventStatus::Skipped | EventStatus::Failed
            ),
            "finalize() only accepts terminal statuses"
        );
        self.status = terminal;
        self.finished_at = Some(Timestamp::now());
        self.skip_category = skip_category;
    }

    /// Marks a long-running `PROCESSING` row `STUCK`. Only the watchdog should call this.
    pub fn mark_stuck(&mut self) {
        if self.status == EventStatus::Processing {
            self.status = EventStatus::Stuck;
        }
    }

    /// Returns whether the row is eligible for the watchdog to mark `STUCK`,
    /// given the configured threshold.
    #[must_use]
    pub fn is_overdue(&self, stuck_threshold_ms: i64, now: Timestamp) -> bool {
        self.status == EventStatus::Processing
            && self
                .started_at
                .is_some_and(|started| now - started >= stuck_threshold_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventAudit {
        EventAudit::ingest(
            EventId::new("e1"),
            TenantId::new("t1"),
            "OP_VISIT_CREATED".to_string(),
            1,
            serde_json::json!({"visitId": "V1"}),
            None,
            None,
        )
    }

    #[test]
    fn claim_is_cas_and_idempotent() {
        let mut audit = sample();
        assert!(audit.try_claim());
        assert_eq!(audit.status, EventStatus::Processing);
        assert!(!audit.try_claim(), "second claim must fail");
    }

    #[test]
    fn finalize_sets_finished_at() {
        let mut audit = sample();
        audit.try_claim();
        audit.finalize(EventStatus::Processed, None);
        assert_eq!(audit.status, EventStatus::Processed);
        assert!(audit.finished_at.is_some());
    }

    #[test]
    fn watchdog_overdue_check() {
        let mut audit = sample();
        audit.try_claim();
        audit.started_at = Some(Timestamp::from_millis(0));
        assert!(audit.is_overdue(5000, Timestamp::from_millis(10_000)));
        assert!(!audit.is_overdue(5000, Timestamp::from_millis(1_000)));
    }
}
