// gateway-delivery/src/watchdog.rs
// ============================================================================
// Module: Stuck Event Watchdog
// Description: C2 — detects audit rows wedged in PROCESSING.
// Purpose: Surface a worker crash or hang mid-dispatch as an observable event
//          rather than a silently orphaned row.
// Dependencies: gateway-core
// ============================================================================

//! ## Overview
//! [`Watchdog::sweep`] asks the audit ledger for every `PROCESSING` row whose
//! `startedAt` is older than `stuck_after_ms`, marks each `STUCK`, and writes
//! it back. A `STUCK` row is a terminal-enough state for reporting purposes
//! but is not one of [`EventAudit::finalize`]'s accepted terminal statuses —
//! it is written through the same `AuditStore::finalize` call because the
//! store interface exposes no other single-row write.

use std::sync::Arc;

use gateway_core::core::Timestamp;
use gateway_core::interfaces::AuditStore;
use gateway_core::interfaces::StoreError;
use thiserror::Error;

use crate::metrics::GatewayMetrics;

/// Errors raised sweeping for stuck events.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Detects and marks audit rows wedged in `PROCESSING`.
pub struct Watchdog {
    audit: Arc<dyn AuditStore>,
    metrics: Arc<dyn GatewayMetrics>,
    stuck_after_ms: i64,
}

impl Watchdog {
    /// Builds a watchdog that considers a `PROCESSING` row stuck once it has
    /// been running longer than `stuck_after_ms`.
    #[must_use]
    pub fn new(audit: Arc<dyn AuditStore>, metrics: Arc<dyn GatewayMetrics>, stuck_after_ms: i64) -> Self {
        Self { audit, metrics, stuck_after_ms }
    }

    /// Sweeps for and marks every currently stuck row. Returns the number of
    /// rows marked.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError`] on a store failure.
    pub async fn sweep(&self) -> Result<usize, WatchdogError> {
        let now = Timestamp::now();
        let threshold = Timestamp::from_millis(now.as_millis() - self.stuck_after_ms);
        let candidates = self.audit.find_stuck_candidates(threshold).await?;
        let marked = candidates.len();
        for mut audit in candidates {
            audit.mark_stuck();
            self.audit.finalize(&audit).await?;
            self.metrics.stuck_event_detected(audit.tenant_id.as_str());
            tracing::warn!(event_id = %audit.event_id, tenant_id = %audit.tenant_id, "event audit marked stuck");
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::core::EventId;
    use gateway_core::core::TenantId;
    use gateway_core::core::audit::EventAudit;
    use gateway_core::runtime::InMemoryAuditStore;

    use super::*;
    use crate::metrics::CountingMetrics;

    #[tokio::test]
    async fn sweep_marks_long_running_rows_stuck() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let event_id = EventId::new("evt-stuck");
        let tenant_id = TenantId::new("tenant-a");
        let mut row = EventAudit::ingest(event_id.clone(), tenant_id, "order.created".to_string(), 1, serde_json::json!({}), None, None);
        assert!(row.try_claim());
        row.started_at = Some(Timestamp::from_millis(0));
        audit.ingest(row).await.expect("seed audit row");

        let metrics = Arc::new(CountingMetrics::default());
        let watchdog = Watchdog::new(audit.clone(), metrics.clone(), 5_000);
        let marked = watchdog.sweep().await.expect("sweep");
        assert_eq!(marked, 1);
        assert_eq!(metrics.stuck_events.load(std::sync::atomic::Ordering::Relaxed), 1);

        let stored = audit.claim(&event_id).await;
        // STUCK is not PENDING, so a claim attempt CAS-fails.
        assert!(matches!(stored, Err(StoreError::CasFailed(_))));
    }

    #[tokio::test]
    async fn sweep_with_nothing_stuck_marks_nothing() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let metrics = Arc::new(CountingMetrics::default());
        let watchdog = Watchdog::new(audit, metrics, 5_000);
        let marked = watchdog.sweep().await.expect("sweep");
        assert_eq!(marked, 0);
    }
}
