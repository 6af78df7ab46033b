// gateway-core/src/core/schedule.rs
// ============================================================================
// Module: Gateway Scheduled Deliveries
// Description: The ScheduledDelivery aggregate and its state machine.
// Purpose: Persist DELAYED (one-shot) and RECURRING deliveries fired by the scheduler worker.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A scheduling script attached to an integration returns either a single
//! future instant (`DELAYED`) or a recurrence spec (`RECURRING`). The
//! scheduler worker claims entries whose `fireAt` has passed and advances
//! `occurrencesFired`/`fireAt` for recurring schedules.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::IntegrationId;
use crate::core::identifiers::ScheduleId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Scheduling mode for a [`ScheduledDelivery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "UPPERCASE")]
pub enum ScheduleMode {
    /// Fires exactly once at `fireAt`.
    Delayed,
    /// Fires repeatedly starting at `firstOccurrence`, every `intervalMs`,
    /// bounded by `maxOccurrences` or `endAt`.
    Recurring {
        /// First firing instant.
        first_occurrence: Timestamp,
        /// Interval between firings, in milliseconds.
        interval_ms: u64,
        /// Maximum number of firings, if bounded by count.
        max_occurrences: Option<u32>,
        /// Last permissible firing instant, if bounded by time.
        end_at: Option<Timestamp>,
    },
}

/// Lifecycle status of a scheduled delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    /// Awaiting its next fire instant.
    Pending,
    /// Fired (terminal for `DELAYED`; recurring schedules return to `PENDING`
    /// for their next occurrence, or to a terminal status when exhausted).
    Sent,
    /// Cancelled by an operator or by the owning integration being disabled.
    Cancelled,
    /// `fireAt` passed more than one worker period ago before being claimed.
    Overdue,
    /// The delivery attempt driven by this schedule failed terminally.
    Failed,
}

// ============================================================================
// SECTION: Scheduled Delivery
// ============================================================================

/// A persisted scheduled delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDelivery {
    /// Entry identifier.
    pub schedule_id: ScheduleId,
    /// Owning integration.
    pub integration_id: IntegrationId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Payload to deliver when fired.
    pub payload: Value,
    /// Scheduling mode and its parameters.
    pub mode: ScheduleMode,
    /// Next instant this entry should fire.
    pub fire_at: Timestamp,
    /// Occurrences fired so far (always 0 for `DELAYED` until sent).
    pub occurrences_fired: u32,
    /// Current status.
    pub status: ScheduleStatus,
}

/// Errors raised by scheduled-delivery state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Cancellation is only allowed from `PENDING` or `OVERDUE`.
    #[error("schedule {0} cannot be cancelled from status {1:?}")]
    NotCancellable(String, ScheduleStatus),
    /// The entry is not due to fire yet.
    #[error("schedule {0} is not due (fireAt in the future)")]
    NotDue(String),
}

impl ScheduledDelivery {
    /// Marks the entry `OVERDUE` if `fireAt` is more than one worker period behind `now`.
    pub fn mark_overdue_if_stale(&mut self, now: Timestamp, worker_period_ms: i64) {
        if self.status == ScheduleStatus::Pending && now - self.fire_at > worker_period_ms {
            self.status = ScheduleStatus::Overdue;
        }
    }

    /// Returns whether the entry is due to fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        matches!(self.status, ScheduleStatus::Pending | ScheduleStatus::Overdue) && now >= self.fire_at
    }

    /// Fires the entry: for `DELAYED`, transitions to `SENT` (terminal). For
    /// `RECURRING`, advances `occurrencesFired` and computes the next
    /// `fireAt` from `now` (catch-up policy: fires once per tick regardless
    /// of how many intervals were missed, then resumes from `now`; see the
    /// recorded Open Question decision), terminating the schedule once the
    /// occurrence cap or `endAt` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotDue`] if `now < fireAt`.
    pub fn fire(&mut self, now: Timestamp) -> Result<(), ScheduleError> {
        if !self.is_due(now) {
            return Err(ScheduleError::NotDue(self.schedule_id.to_string()));
        }
        self.occurrences_fired += 1;
        match &self.mode {
            ScheduleMode::Delayed => {
                self.status = ScheduleStatus::Sent;
            }
            ScheduleMode::Recurring {
                interval_ms,
                max_occurrences,
                end_at,
                ..
            } => {
                let exhausted_by_count = max_occurrences.is_some_and(|cap| self.occurrences_fired >= cap);
                let next_fire = now.plus(std::time::Duration::from_millis(*interval_ms));
                let exhausted_by_time = end_at.is_some_and(|end| next_fire > end);
                if exhausted_by_count || exhausted_by_time {
                    self.status = ScheduleStatus::Sent;
                } else {
                    self.fire_at = next_fire;
                    self.status = ScheduleStatus::Pending;
                }
            }
        }
        Ok(())
    }

    /// Marks the entry `FAILED` after the delivery attempt it drove failed terminally.
    pub fn mark_failed(&mut self) {
        self.status = ScheduleStatus::Failed;
    }

    /// Cancels the entry. Only permitted from `PENDING` or `OVERDUE`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NotCancellable`] otherwise.
    pub fn cancel(&mut self) -> Result<(), ScheduleError> {
        if !matches!(self.status, ScheduleStatus::Pending | ScheduleStatus::Overdue) {
            return Err(ScheduleError::NotCancellable(self.schedule_id.to_string(), self.status));
        }
        self.status = ScheduleStatus::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delayed() -> ScheduledDelivery {
        ScheduledDelivery {
            schedule_id: ScheduleId::new("s1"),
            integration_id: IntegrationId::new("int-1"),
            tenant_id: TenantId::new("t1"),
            payload: serde_json::json!({}),
            mode: ScheduleMode::Delayed,
            fire_at: Timestamp::from_millis(3_600_000),
            occurrences_fired: 0,
            status: ScheduleStatus::Pending,
        }
    }

    #[test]
    fn delayed_fires_once_and_terminates() {
        let mut schedule = delayed();
        assert!(!schedule.is_due(Timestamp::from_millis(0)));
        assert!(schedule.is_due(Timestamp::from_millis(3_600_000)));
        schedule.fire(Timestamp::from_millis(3_600_000)).unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Sent);
    }

    #[test]
    fn recurring_advances_and_caps_by_count() {
        let mut schedule = delayed();
        schedule.mode = ScheduleMode::Recurring {
            first_occurrence: Timestamp::from_millis(0),
            interval_ms: 1000,
            max_occurrences: Some(2),
            end_at: None,
        };
        schedule.fire_at = Timestamp::from_millis(0);
        schedule.fire(Timestamp::from_millis(0)).unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Pending);
        assert_eq!(schedule.occurrences_fired, 1);
        schedule.fire(Timestamp::from_millis(1000)).unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Sent);
        assert_eq!(schedule.occurrences_fired, 2);
    }

    #[test]
    fn cancel_only_from_pending_or_overdue() {
        let mut schedule = delayed();
        schedule.status = ScheduleStatus::Sent;
        assert!(schedule.cancel().is_err());
    }
}
