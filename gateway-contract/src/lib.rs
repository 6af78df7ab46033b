// gateway-contract/src/lib.rs
// ============================================================================
// Crate: gateway-contract
// Description: Wire DTOs for the gateway's external HTTP surface.
// Purpose: Give gateway-server and its callers one shared, serde-stable
//          vocabulary for the endpoints named in spec.md §6, independent of
//          the internal aggregate types gateway-core models execution with.
// Dependencies: gateway-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Handlers in `gateway-server` build these types directly from
//! `gateway-core` aggregates (`DLQEntry`, `ExecutionLog`, ...); nothing here
//! owns persistence or business logic. Keeping the wire shape in its own
//! crate means a future API version can diverge from the internal aggregate
//! shape without the server crate's handler bodies changing.

use gateway_core::core::DLQEntry;
use gateway_core::core::ExecutionLog;
use gateway_core::core::Step;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process can answer at all.
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "ok".to_string() }
    }
}

/// A single-field error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable failure reason.
    pub error: String,
}

impl ErrorResponse {
    /// Builds an error body from any displayable failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

/// `POST /api/v1/events/test-notification-queue` request body: injects one
/// synthetic event directly into the audit ledger, bypassing a real source
/// adapter, for exercising the matcher/delivery path end to end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationRequest {
    /// Owning tenant.
    pub tenant_id: String,
    /// Event type used for matcher fan-out.
    pub event_type: String,
    /// Event payload.
    pub payload: Value,
    /// Source checkpoint offset to record; defaults to `0` for a one-off test event.
    #[serde(default)]
    pub checkpoint_offset: i64,
}

/// `POST /api/v1/events/test-notification-queue` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationResponse {
    /// The event id the audit ledger assigned.
    pub event_id: String,
    /// Whether the event was immediately dispatched (`true`) or only ingested
    /// for a background worker to pick up (`false`).
    pub dispatched: bool,
}

/// `GET /dlq` response body.
#[derive(Debug, Clone, Serialize)]
pub struct DlqListResponse {
    /// Entries, most-recently-upserted order as returned by the store.
    pub entries: Vec<DLQEntry>,
}

/// `GET /dlq/stats` response body.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DlqStatsResponse {
    /// Count with `status = pending`.
    pub pending: usize,
    /// Count with `status = retrying`.
    pub retrying: usize,
    /// Count with `status = resolved`.
    pub resolved: usize,
    /// Count with `status = abandoned`.
    pub abandoned: usize,
}

/// `POST /dlq/:id/retry` and `POST /dlq/:id/abandon` request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DlqActionRequest {
    /// Operator identity, recorded on the resulting resolution when present.
    #[serde(default)]
    pub by: Option<String>,
    /// Free-form operator notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /dlq/:id/retry` response body.
#[derive(Debug, Clone, Serialize)]
pub struct DlqRetryResponse {
    /// The outcome of the redelivery attempt: `"success"`, `"retried"`, or `"failed"`.
    pub outcome: String,
}

/// `GET /execution-logs` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLogListResponse {
    /// Logs, most recent first.
    pub logs: Vec<ExecutionLog>,
}

/// `GET /execution-logs/:traceId/timeline` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogTimelineResponse {
    /// The trace id the timeline belongs to.
    pub trace_id: String,
    /// Ordered steps recorded so far.
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_defaults_to_ok() {
        let body = HealthResponse::default();
        assert_eq!(body.status, "ok");
    }

    #[test]
    fn test_notification_request_defaults_checkpoint_offset_to_zero() {
        let parsed: TestNotificationRequest =
            serde_json::from_value(serde_json::json!({"tenantId": "t1", "eventType": "order.created", "payload": {}})).expect("parse");
        assert_eq!(parsed.checkpoint_offset, 0);
    }
}
