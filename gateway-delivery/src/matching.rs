// gateway-delivery/src/matching.rs
// ============================================================================
// Module: Event Dispatch
// Description: C4/C5 — claims pending audit rows and fans them out across
//              matched integrations.
// Purpose: Bridge the audit ledger and matcher into concrete delivery attempts.
// Dependencies: gateway-core
// ============================================================================

//! ## Overview
//! [`EventDispatcher::dispatch_one`] claims one `PENDING` audit row via CAS,
//! resolves the candidate integrations for its tenant/event-type, runs them
//! through [`Matcher::select`], and drives a [`DeliveryEngine::deliver_event`]
//! per match. The audit row's terminal status reflects the aggregate: no
//! match is `SKIPPED`, every match succeeding is `PROCESSED`, any match
//! ending in `Failed` or `Retried` is `FAILED` (the event still has DLQ
//! entries tracking retry, but the audit row itself is done — the DLQ is the
//! retry ledger from here on).

use std::sync::Arc;

use gateway_core::core::EventId;
use gateway_core::core::TenantId;
use gateway_core::core::audit::EventStatus;
use gateway_core::core::audit::SkipCategory;
use gateway_core::interfaces::AuditStore;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::Sandbox;
use gateway_core::interfaces::StoreError;
use gateway_core::runtime::Matcher;
use thiserror::Error;

use crate::metrics::GatewayMetrics;
use crate::pipeline::DeliveryEngine;
use crate::pipeline::DeliveryError;
use crate::pipeline::DeliveryOutcome;

/// Errors raised dispatching one claimed event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A delivery attempt failed at the infrastructure level.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Claims and dispatches audit rows across matched integrations.
pub struct EventDispatcher {
    audit: Arc<dyn AuditStore>,
    config: Arc<dyn ConfigStore>,
    sandbox: Arc<dyn Sandbox>,
    engine: Arc<DeliveryEngine>,
    metrics: Arc<dyn GatewayMetrics>,
}

impl EventDispatcher {
    /// Builds a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        audit: Arc<dyn AuditStore>,
        config: Arc<dyn ConfigStore>,
        sandbox: Arc<dyn Sandbox>,
        engine: Arc<DeliveryEngine>,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        Self { audit, config, sandbox, engine, metrics }
    }

    /// Claims `event_id`'s audit row and dispatches it across every matching,
    /// active integration. Returns `false` if the row was already claimed by
    /// another worker (a benign race, not an error).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] on any store failure.
    pub async fn dispatch(&self, event_id: &EventId, tenant_id: &TenantId) -> Result<bool, DispatchError> {
        let mut audit = match self.audit.claim(event_id).await {
            Ok(audit) => audit,
            Err(StoreError::CasFailed(_)) => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        let ancestors = self.config.ancestors_of(tenant_id).await?;
        let candidates = self.config.list_for_tenant_and_event(tenant_id, &audit.event_type).await?;
        let payload = audit.payload_full.clone().unwrap_or_else(|| audit.payload_summary.clone());
        let context = serde_json::json!({"eventType": audit.event_type, "tenantId": tenant_id.as_str()});

        let matcher = Matcher::new(self.sandbox.as_ref());
        let matches = matcher.select(&candidates, tenant_id, &ancestors, &audit.event_type, &payload, &context);

        if matches.is_empty() {
            audit.finalize(EventStatus::Skipped, Some(SkipCategory::NoMatchingIntegration));
            self.audit.finalize(&audit).await?;
            return Ok(true);
        }

        // A store-layer failure here is left for the watchdog: the row stays
        // PROCESSING rather than being finalized on partial fan-out.
        let mut any_retriable_or_failed = false;
        for integration in &matches {
            match self.engine.deliver_event(integration, event_id, tenant_id, payload.clone()).await? {
                DeliveryOutcome::Success => {}
                DeliveryOutcome::Retried | DeliveryOutcome::Failed => any_retriable_or_failed = true,
            }
        }

        let terminal = if any_retriable_or_failed { EventStatus::Failed } else { EventStatus::Processed };
        audit.finalize(terminal, None);
        self.audit.finalize(&audit).await?;
        self.metrics.delivery_attempted(event_id.as_str(), "dispatched");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::core::EventId;
    use gateway_core::core::audit::EventAudit;
    use gateway_core::runtime::InMemoryAuditStore;
    use gateway_core::runtime::InMemoryConfigStore;
    use gateway_core::runtime::InMemoryDlqStore;
    use gateway_core::runtime::InMemoryExecutionLogStore;

    use super::*;
    use crate::metrics::CountingMetrics;
    use crate::test_support;

    fn dispatcher(audit: Arc<InMemoryAuditStore>, config: Arc<InMemoryConfigStore>) -> EventDispatcher {
        let log_store = Arc::new(InMemoryExecutionLogStore::new());
        let dlq_store = Arc::new(InMemoryDlqStore::new());
        let metrics = Arc::new(CountingMetrics::default());
        let engine = Arc::new(test_support::engine(config.clone(), log_store, dlq_store));
        EventDispatcher::new(audit, config, Arc::new(test_support::AllowAllSandbox), engine, metrics)
    }

    #[tokio::test]
    async fn dispatch_with_no_candidates_skips_the_event() {
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let event_id = EventId::new("evt-1");
        let tenant_id = TenantId::new("tenant-a");
        audit_store
            .ingest(EventAudit::ingest(event_id.clone(), tenant_id.clone(), "order.created".to_string(), 1, serde_json::json!({}), None, None))
            .await
            .expect("ingest");

        let dispatcher = dispatcher(audit_store.clone(), config_store);
        let claimed = dispatcher.dispatch(&event_id, &tenant_id).await.expect("dispatch");
        assert!(claimed);

        let row = audit_store.claim(&event_id).await;
        // Already finalized SKIPPED, so a second claim attempt CAS-fails.
        assert!(matches!(row, Err(StoreError::CasFailed(_))));
    }

    #[tokio::test]
    async fn dispatch_on_an_already_claimed_event_returns_false() {
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let event_id = EventId::new("evt-2");
        let tenant_id = TenantId::new("tenant-a");
        audit_store
            .ingest(EventAudit::ingest(event_id.clone(), tenant_id.clone(), "order.created".to_string(), 1, serde_json::json!({}), None, None))
            .await
            .expect("ingest");
        audit_store.claim(&event_id).await.expect("first claim");

        let dispatcher = dispatcher(audit_store, config_store);
        let claimed = dispatcher.dispatch(&event_id, &tenant_id).await.expect("dispatch");
        assert!(!claimed);
    }
}
