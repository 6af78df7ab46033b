// gateway-core/src/core/log.rs
// ============================================================================
// Module: Gateway Execution Log
// Description: The unified per-message execution log and its ordered steps.
// Purpose: Stitch audit, matching, transform, auth, and delivery into one trace.
// Dependencies: crate::core::{category, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! `ExecutionLog` is the single writer surface for a `traceId`: every step of
//! the delivery pipeline (or the inbound proxy, or a scheduled job) appends a
//! [`Step`] in order, and the log records gap timings and a terminal status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::category::ErrorCategory;
use crate::core::identifiers::IntegrationId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// What originated this execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerType {
    /// Triggered by a matched source event.
    Event,
    /// Triggered by an inbound proxy call.
    Api,
    /// Triggered by a scheduled/recurring delivery firing.
    Schedule,
}

/// Terminal/in-flight status of an execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// In flight, first attempt.
    Pending,
    /// In flight, a retry attempt is scheduled or running.
    Retrying,
    /// Completed successfully.
    Success,
    /// Completed with a terminal failure.
    Failed,
}

/// Status of a single [`Step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step completed without error.
    Success,
    /// The step failed.
    Failed,
}

// ============================================================================
// SECTION: Step
// ============================================================================

/// One ordered step within an [`ExecutionLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, e.g. `"validation"`, `"rate_limit"`, `"transform"`, `"auth"`,
    /// `"http_request"`, `"classify"`, `"post_process"`.
    pub name: String,
    /// Instant the step started.
    pub timestamp: Timestamp,
    /// Step execution duration.
    pub duration_ms: u64,
    /// Step outcome.
    pub status: StepStatus,
    /// Free-form structured metadata (e.g., rate-limit remaining, HTTP status).
    pub metadata: Value,
    /// Error message, present iff `status = FAILED`.
    pub error: Option<String>,
    /// Error category, present iff `status = FAILED`.
    pub category: Option<ErrorCategory>,
    /// Milliseconds between the end of the previous step and the start of this one.
    pub gap_ms: Option<i64>,
}

impl Step {
    /// Builds a successful step.
    #[must_use]
    pub fn success(name: impl Into<String>, timestamp: Timestamp, duration_ms: u64, metadata: Value) -> Self {
        Self {
            name: name.into(),
            timestamp,
            duration_ms,
            status: StepStatus::Success,
            metadata,
            error: None,
            category: None,
            gap_ms: None,
        }
    }

    /// Builds a failed step.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        timestamp: Timestamp,
        duration_ms: u64,
        error: impl Into<String>,
        category: ErrorCategory,
        metadata: Value,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            duration_ms,
            status: StepStatus::Failed,
            metadata,
            error: Some(error.into()),
            category: Some(category),
            gap_ms: None,
        }
    }

    /// Returns the instant this step ended, derived from `timestamp + duration_ms`.
    #[must_use]
    pub fn ends_at(&self) -> Timestamp {
        self.timestamp.plus(std::time::Duration::from_millis(self.duration_ms))
    }
}

// ============================================================================
// SECTION: Request / Response Snapshots
// ============================================================================

/// A bounded, redacted snapshot of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestSnapshot {
    /// Request URL.
    pub url: String,
    /// Request method.
    pub method: String,
    /// Redacted request headers.
    pub headers: HashMap<String, String>,
    /// Truncated request body.
    pub body: Option<String>,
}

/// A bounded snapshot of a received response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResponseSnapshot {
    /// HTTP status code.
    pub status_code: u16,
    /// Redacted response headers.
    pub headers: HashMap<String, String>,
    /// Truncated response body.
    pub body: Option<String>,
}

// ============================================================================
// SECTION: Execution Log
// ============================================================================

/// Unified per-message execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// Trace identifier, generated at entry or accepted from the source.
    pub trace_id: TraceId,
    /// Source message identifier, when distinct from `traceId`.
    pub message_id: String,
    /// Delivery direction this execution took.
    pub direction: crate::core::config::Direction,
    /// What originated this execution.
    pub trigger_type: TriggerType,
    /// Integration this execution ran under.
    pub integration_id: IntegrationId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Current status.
    pub status: LogStatus,
    /// Instant the execution started.
    pub started_at: Timestamp,
    /// Instant the execution reached a terminal status.
    pub finished_at: Option<Timestamp>,
    /// Total duration, set when `finished_at` is set.
    pub duration_ms: Option<u64>,
    /// Request snapshot, set once `http_request` runs.
    pub request: Option<RequestSnapshot>,
    /// Response snapshot, set once a response is received.
    pub response: Option<ResponseSnapshot>,
    /// Ordered steps recorded so far.
    pub steps: Vec<Step>,
    /// Top-level error message, set iff `status = FAILED`.
    pub error: Option<String>,
}

impl ExecutionLog {
    /// Opens a new, `pending` execution log.
    #[must_use]
    pub fn open(
        trace_id: TraceId,
        message_id: impl Into<String>,
        direction: crate::core::config::Direction,
        trigger_type: TriggerType,
        integration_id: IntegrationId,
        tenant_id: TenantId,
    ) -> Self {
        Self {
            trace_id,
            message_id: message_id.into(),
            direction,
            trigger_type,
            integration_id,
            tenant_id,
            status: LogStatus::Pending,
            started_at: Timestamp::now(),
            finished_at: None,
            duration_ms: None,
            request: None,
            response: None,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Appends a step, computing its `gap_ms` from the previous step's end instant.
    pub fn record_step(&mut self, mut step: Step) {
        if let Some(previous) = self.steps.last() {
            step.gap_ms = Some(step.timestamp - previous.ends_at());
        }
        self.steps.push(step);
    }

    /// Finalizes the log with a terminal status.
    pub fn finalize(&mut self, status: LogStatus, error: Option<String>) {
        let now = Timestamp::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).max(0) as u64);
        self.error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Direction;

    #[test]
    fn steps_are_ordered_with_gaps() {
        let mut log = ExecutionLog::open(
            TraceId::new("trace-1"),
            "m-1",
            Direction::Outbound,
            TriggerType::Event,
            IntegrationId::new("int-1"),
            TenantId::new("t1"),
        );
        log.record_step(Step::success(
            "validation",
            Timestamp::from_millis(0),
            10,
            serde_json::json!({}),
        ));
        log.record_step(Step::success(
            "rate_limit",
            Timestamp::from_millis(50),
            5,
            serde_json::json!({}),
        ));
        assert_eq!(log.steps[1].gap_ms, Some(40));
    }

    #[test]
    fn finalize_computes_duration() {
        let mut log = ExecutionLog::open(
            TraceId::new("trace-1"),
            "m-1",
            Direction::Outbound,
            TriggerType::Event,
            IntegrationId::new("int-1"),
            TenantId::new("t1"),
        );
        log.started_at = Timestamp::from_millis(0);
        log.finalize(LogStatus::Success, None);
        assert_eq!(log.status, LogStatus::Success);
        assert!(log.duration_ms.is_some());
    }
}
