// gateway-delivery/src/retry.rs
// ============================================================================
// Module: Retry / DLQ Worker
// Description: C10 — claims due DLQ entries and redrives them through the
//              delivery pipeline.
// Purpose: Turn a transient delivery failure into an eventually-delivered
//          message, or a bounded, observable abandonment.
// Dependencies: gateway-core
// ============================================================================

//! ## Overview
//! [`RetryWorker::run_once`] claims every DLQ entry due to retry and
//! redelivers it via [`DeliveryEngine::redeliver`]. `DeliveryEngine` owns all
//! further state transitions (another failure re-upserts the entry with a
//! fresh backoff or abandons it; a success resolves it), so this worker's
//! only job is claiming and routing.

use std::sync::Arc;

use gateway_core::core::Timestamp;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::DlqStore;
use gateway_core::interfaces::StoreError;
use thiserror::Error;

use crate::metrics::GatewayMetrics;
use crate::pipeline::DeliveryEngine;
use crate::pipeline::DeliveryError;

/// Errors raised redriving one batch of DLQ entries.
#[derive(Debug, Error)]
pub enum RetryError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A redelivery attempt failed at the infrastructure level.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Claims and redrives due DLQ entries.
pub struct RetryWorker {
    dlq: Arc<dyn DlqStore>,
    config: Arc<dyn ConfigStore>,
    engine: Arc<DeliveryEngine>,
    metrics: Arc<dyn GatewayMetrics>,
}

impl RetryWorker {
    /// Builds a retry worker over the given collaborators.
    #[must_use]
    pub fn new(dlq: Arc<dyn DlqStore>, config: Arc<dyn ConfigStore>, engine: Arc<DeliveryEngine>, metrics: Arc<dyn GatewayMetrics>) -> Self {
        Self { dlq, config, engine, metrics }
    }

    /// Claims up to `batch_size` due entries and redrives each. Returns the
    /// number of entries claimed.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError`] on a store failure claiming the batch; failures
    /// redriving an individual entry are logged and skipped so one bad entry
    /// cannot stall the rest of the batch.
    pub async fn run_once(&self, batch_size: usize) -> Result<usize, RetryError> {
        let due = self.dlq.claim_due(Timestamp::now(), batch_size).await?;
        let claimed = due.len();
        for mut entry in due {
            let Some(integration) = self.config.get_by_id(&entry.integration_id).await? else {
                tracing::warn!(dlq_id = %entry.dlq_id, "abandoning dlq entry: integration no longer exists");
                let _ = entry.abandon(None, Some("integration_deleted".to_string()));
                self.dlq.upsert(&entry).await?;
                self.metrics.dlq_abandoned(entry.integration_id.as_str());
                continue;
            };

            if let Err(err) = self.engine.redeliver(&entry, &integration).await {
                tracing::error!(dlq_id = %entry.dlq_id, error = %err, "redelivery attempt errored");
            }
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::core::DLQEntry;
    use gateway_core::core::Direction;
    use gateway_core::core::ErrorCategory;
    use gateway_core::core::RetryStrategy;
    use gateway_core::core::dlq::DlqStatus;
    use gateway_core::core::dlq::ErrorDetail;
    use gateway_core::core::DlqId;
    use gateway_core::core::IntegrationId;
    use gateway_core::core::TenantId;
    use gateway_core::core::TraceId;
    use gateway_core::runtime::InMemoryConfigStore;
    use gateway_core::runtime::InMemoryDlqStore;
    use gateway_core::runtime::InMemoryExecutionLogStore;

    use super::*;
    use crate::metrics::CountingMetrics;
    use crate::test_support;

    fn pending_entry(integration_id: &str) -> DLQEntry {
        let now = Timestamp::now();
        DLQEntry {
            dlq_id: DlqId::new("dlq-1"),
            trace_id: TraceId::new("trace-1"),
            execution_log_id: TraceId::new("trace-1"),
            integration_id: IntegrationId::new(integration_id),
            tenant_id: TenantId::new("tenant-a"),
            direction: Direction::Outbound,
            payload: serde_json::json!({"ok": true}),
            error: ErrorDetail { message: "boom".to_string(), code: None, category: ErrorCategory::Network, status_code: None },
            retry_strategy: RetryStrategy::Exponential,
            retry_count: 1,
            max_retries: 3,
            next_retry_at: now,
            last_attempt_at: now,
            status: DlqStatus::Pending,
            resolution: None,
        }
    }

    #[tokio::test]
    async fn run_once_abandons_entries_whose_integration_was_deleted() {
        let dlq_store = Arc::new(InMemoryDlqStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let entry = pending_entry("missing-integration");
        let dlq_id = entry.dlq_id.clone();
        dlq_store.upsert(&entry).await.expect("seed dlq entry");

        let log_store = Arc::new(InMemoryExecutionLogStore::new());
        let engine = Arc::new(test_support::engine(config_store.clone(), log_store, dlq_store.clone()));
        let metrics = Arc::new(CountingMetrics::default());
        let worker = RetryWorker::new(dlq_store.clone(), config_store, engine, metrics.clone());

        let claimed = worker.run_once(10).await.expect("run_once");
        assert_eq!(claimed, 1);

        let stored = dlq_store.get(&dlq_id).await.expect("get").expect("entry still present");
        assert_eq!(stored.status, DlqStatus::Abandoned);
        assert_eq!(metrics.dlq_abandoned.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn run_once_with_nothing_due_claims_nothing() {
        let dlq_store = Arc::new(InMemoryDlqStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let log_store = Arc::new(InMemoryExecutionLogStore::new());
        let engine = Arc::new(test_support::engine(config_store.clone(), log_store, dlq_store.clone()));
        let metrics = Arc::new(CountingMetrics::default());
        let worker = RetryWorker::new(dlq_store, config_store, engine, metrics);

        let claimed = worker.run_once(10).await.expect("run_once");
        assert_eq!(claimed, 0);
    }
}
