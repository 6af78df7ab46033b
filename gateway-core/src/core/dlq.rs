// gateway-core/src/core/dlq.rs
// ============================================================================
// Module: Gateway Dead-Letter Queue
// Description: The DLQEntry aggregate and its monotonic status transitions.
// Purpose: Hold failed deliveries pending retry or operator resolution.
// Dependencies: crate::core::{category, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A `DLQEntry` is created the first time a delivery attempt fails in a
//! retriable way. Status only ever moves forward: `pending` and `retrying`
//! may alternate, but once `resolved` or `abandoned` is reached the entry is
//! closed for good — see the monotonic-DLQ-state testable property.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::category::ErrorCategory;
use crate::core::config::Direction;
use crate::core::identifiers::DlqId;
use crate::core::identifiers::IntegrationId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Backoff strategy governing `nextRetryAt` computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// `base * multiplier^retryCount`, capped.
    Exponential,
    /// A fixed offset from `now` on every retry.
    Fixed,
}

/// DLQ entry lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    /// Awaiting its next retry window.
    Pending,
    /// Currently being retried (claimed by the DLQ worker).
    Retrying,
    /// Successfully redelivered.
    Resolved,
    /// Abandoned after exceeding `maxRetries` or by operator action.
    Abandoned,
}

/// The classified error that caused the entry to be created or updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error code, when the source supplied one.
    pub code: Option<String>,
    /// Error taxonomy category.
    pub category: ErrorCategory,
    /// HTTP status code, when the failure came from an HTTP response.
    pub status_code: Option<u16>,
}

/// How a DLQ entry reached a terminal resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Redelivered successfully by the DLQ worker.
    AutoRetry,
    /// An operator manually retried it.
    ManualRetry,
    /// Exceeded `maxRetries`.
    MaxRetriesExceeded,
    /// An operator manually abandoned it.
    ManualAbandon,
}

/// Terminal resolution details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// How the entry was resolved.
    pub method: ResolutionMethod,
    /// Instant of resolution.
    pub at: Timestamp,
    /// Operator identity, for manual resolutions.
    pub by: Option<String>,
    /// Free-form operator notes.
    pub notes: Option<String>,
}

// ============================================================================
// SECTION: DLQ Entry
// ============================================================================

/// A dead-letter queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DLQEntry {
    /// Entry identifier.
    pub dlq_id: DlqId,
    /// Correlated execution trace.
    pub trace_id: TraceId,
    /// Correlated execution log identifier (same value as `trace_id` today;
    /// kept distinct on the wire for forward compatibility).
    pub execution_log_id: TraceId,
    /// Integration this delivery belongs to.
    pub integration_id: IntegrationId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Delivery direction.
    pub direction: Direction,
    /// The original, pre-transform payload, retained for redelivery.
    pub payload: Value,
    /// Classified failure detail.
    pub error: ErrorDetail,
    /// Backoff strategy.
    pub retry_strategy: RetryStrategy,
    /// Attempts made so far.
    pub retry_count: u32,
    /// Attempts allowed before abandonment.
    pub max_retries: u32,
    /// Next scheduled retry instant.
    pub next_retry_at: Timestamp,
    /// Instant of the most recent attempt.
    pub last_attempt_at: Timestamp,
    /// Current status.
    pub status: DlqStatus,
    /// Terminal resolution details, set iff `status` is `resolved` or `abandoned`.
    pub resolution: Option<Resolution>,
}

/// Errors raised by DLQ state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DlqError {
    /// Attempted to transition out of a terminal status.
    #[error("dlq entry {0} is already terminal ({1:?})")]
    AlreadyTerminal(String, DlqStatus),
    /// Attempted to claim an entry that is not `pending`.
    #[error("dlq entry {0} is not pending (status={1:?})")]
    NotPending(String, DlqStatus),
}

impl DLQEntry {
    const DEFAULT_BASE_MS: i64 = 1_000;
    const DEFAULT_MULTIPLIER: f64 = 2.0;
    const DEFAULT_CAP_MS: i64 = 15 * 60 * 1_000;

    /// Computes the exponential backoff delay for the given retry count (1-based).
    #[must_use]
    pub fn exponential_backoff_ms(retry_count: u32) -> i64 {
        let raw = (Self::DEFAULT_BASE_MS as f64) * Self::DEFAULT_MULTIPLIER.powi(retry_count as i32 - 1);
        (raw as i64).min(Self::DEFAULT_CAP_MS)
    }

    /// Attempts the CAS transition `pending -> retrying`.
    ///
    /// # Errors
    ///
    /// Returns [`DlqError::NotPending`] if the entry is not currently `pending`.
    pub fn claim(&mut self) -> Result<(), DlqError> {
        if self.status != DlqStatus::Pending {
            return Err(DlqError::NotPending(self.dlq_id.to_string(), self.status));
        }
        self.status = DlqStatus::Retrying;
        Ok(())
    }

    /// Records a failed retry attempt, bumping `retryCount` and computing the
    /// next retry instant, or abandoning the entry once `maxRetries` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`DlqError::AlreadyTerminal`] if the entry is already resolved
    /// or abandoned.
    pub fn record_failed_attempt(&mut self, error: ErrorDetail) -> Result<(), DlqError> {
        if matches!(self.status, DlqStatus::Resolved | DlqStatus::Abandoned) {
            return Err(DlqError::AlreadyTerminal(self.dlq_id.to_string(), self.status));
        }
        self.error = error;
        self.retry_count += 1;
        self.last_attempt_at = Timestamp::now();
        if self.retry_count >= self.max_retries {
            self.status = DlqStatus::Abandoned;
            self.resolution = Some(Resolution {
                method: ResolutionMethod::MaxRetriesExceeded,
                at: Timestamp::now(),
                by: None,
                notes: Some("max_retries_exceeded".to_string()),
            });
            return Ok(());
        }
        let delay_ms = match self.retry_strategy {
            RetryStrategy::Exponential => Self::exponential_backoff_ms(self.retry_count),
            RetryStrategy::Fixed => Self::DEFAULT_BASE_MS,
        };
        self.next_retry_at = self.last_attempt_at.plus(std::time::Duration::from_millis(delay_ms as u64));
        self.status = DlqStatus::Pending;
        Ok(())
    }

    /// Marks the entry resolved after a successful redelivery.
    ///
    /// # Errors
    ///
    /// Returns [`DlqError::AlreadyTerminal`] if already terminal.
    pub fn resolve(&mut self, method: ResolutionMethod, by: Option<String>, notes: Option<String>) -> Result<(), DlqError> {
        if matches!(self.status, DlqStatus::Resolved | DlqStatus::Abandoned) {
            return Err(DlqError::AlreadyTerminal(self.dlq_id.to_string(), self.status));
        }
        self.status = DlqStatus::Resolved;
        self.resolution = Some(Resolution {
            method,
            at: Timestamp::now(),
            by,
            notes,
        });
        Ok(())
    }

    /// Manually abandons the entry (operator action).
    ///
    /// # Errors
    ///
    /// Returns [`DlqError::AlreadyTerminal`] if already terminal.
    pub fn abandon(&mut self, by: Option<String>, notes: Option<String>) -> Result<(), DlqError> {
        if matches!(self.status, DlqStatus::Resolved | DlqStatus::Abandoned) {
            return Err(DlqError::AlreadyTerminal(self.dlq_id.to_string(), self.status));
        }
        self.status = DlqStatus::Abandoned;
        self.resolution = Some(Resolution {
            method: ResolutionMethod::ManualAbandon,
            at: Timestamp::now(),
            by,
            notes,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DLQEntry {
        DLQEntry {
            dlq_id: DlqId::new("dlq-1"),
            trace_id: TraceId::new("trace-1"),
            execution_log_id: TraceId::new("trace-1"),
            integration_id: IntegrationId::new("int-1"),
            tenant_id: TenantId::new("t1"),
            direction: Direction::Outbound,
            payload: serde_json::json!({}),
            error: ErrorDetail {
                message: "boom".to_string(),
                code: None,
                category: ErrorCategory::Network,
                status_code: None,
            },
            retry_strategy: RetryStrategy::Exponential,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: Timestamp::from_millis(0),
            last_attempt_at: Timestamp::from_millis(0),
            status: DlqStatus::Pending,
            resolution: None,
        }
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(DLQEntry::exponential_backoff_ms(1), 1_000);
        assert_eq!(DLQEntry::exponential_backoff_ms(2), 2_000);
        assert_eq!(DLQEntry::exponential_backoff_ms(3), 4_000);
        assert_eq!(DLQEntry::exponential_backoff_ms(20), 15 * 60 * 1_000);
    }

    #[test]
    fn abandons_after_max_retries() {
        let mut entry = sample();
        entry.max_retries = 2;
        entry.claim().unwrap();
        entry
            .record_failed_attempt(ErrorDetail {
                message: "1".to_string(),
                code: None,
                category: ErrorCategory::Network,
                status_code: None,
            })
            .unwrap();
        assert_eq!(entry.status, DlqStatus::Pending);
        entry.claim().unwrap();
        entry
            .record_failed_attempt(ErrorDetail {
                message: "2".to_string(),
                code: None,
                category: ErrorCategory::Network,
                status_code: None,
            })
            .unwrap();
        assert_eq!(entry.status, DlqStatus::Abandoned);
    }

    #[test]
    fn terminal_status_is_monotonic() {
        let mut entry = sample();
        entry.claim().unwrap();
        entry.resolve(ResolutionMethod::AutoRetry, None, None).unwrap();
        assert_eq!(
            entry.claim(),
            Err(DlqError::NotPending("dlq-1".to_string(), DlqStatus::Resolved))
        );
    }
}
