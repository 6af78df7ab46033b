// gateway-delivery/src/schedule.rs
// ============================================================================
// Module: Scheduled Delivery Worker
// Description: C11 — claims due scheduled deliveries and fires them.
// Purpose: Turn a DELAYED or RECURRING schedule entry into a delivery attempt.
// Dependencies: gateway-core
// ============================================================================

//! ## Overview
//! [`ScheduleWorker::run_once`] claims every entry due to fire, advances its
//! state via [`ScheduledDelivery::fire`] (terminal for `DELAYED`, re-armed for
//! `RECURRING`), persists the advanced entry, and drives a delivery attempt
//! through [`DeliveryEngine::deliver_scheduled`]. A fire failure (entry no
//! longer due, already terminal) is logged and the entry skipped rather than
//! aborting the batch.

use std::sync::Arc;

use gateway_core::core::Timestamp;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::ScheduleStore;
use gateway_core::interfaces::StoreError;
use thiserror::Error;

use crate::fetch::DataSource;
use crate::metrics::GatewayMetrics;
use crate::pipeline::DeliveryEngine;

/// Errors raised firing one batch of scheduled deliveries.
#[derive(Debug, Error)]
pub enum ScheduleWorkerError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Claims and fires due scheduled deliveries.
pub struct ScheduleWorker {
    schedules: Arc<dyn ScheduleStore>,
    config: Arc<dyn ConfigStore>,
    engine: Arc<DeliveryEngine>,
    data_source: Arc<dyn DataSource>,
    metrics: Arc<dyn GatewayMetrics>,
}

impl ScheduleWorker {
    /// Builds a schedule worker over the given collaborators.
    #[must_use]
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        config: Arc<dyn ConfigStore>,
        engine: Arc<DeliveryEngine>,
        data_source: Arc<dyn DataSource>,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        Self { schedules, config, engine, data_source, metrics }
    }

    /// Claims up to `batch_size` due entries and fires each. An integration
    /// with a `fetch_query` runs it first and delivers the fetched value
    /// instead of the payload captured when the schedule was created; one
    /// with none delivers that captured payload unchanged. Returns the
    /// number of entries claimed.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleWorkerError`] on a store failure claiming the batch.
    pub async fn run_once(&self, batch_size: usize) -> Result<usize, ScheduleWorkerError> {
        let now = Timestamp::now();
        let due = self.schedules.claim_due(now, batch_size).await?;
        let claimed = due.len();
        for mut entry in due {
            if let Err(err) = entry.fire(now) {
                tracing::warn!(schedule_id = %entry.schedule_id, error = %err, "scheduled delivery was not due at claim time");
                continue;
            }
            self.schedules.upsert(&entry).await?;

            let Some(integration) = self.config.get_by_id(&entry.integration_id).await? else {
                tracing::warn!(schedule_id = %entry.schedule_id, "skipping fire: integration no longer exists");
                continue;
            };

            let payload = match &integration.fetch_query {
                Some(spec) => match self.data_source.fetch(spec, &entry.tenant_id, &integration.id).await {
                    Ok(fetched) => fetched,
                    Err(err) => {
                        tracing::error!(schedule_id = %entry.schedule_id, error = %err, "fetch_data step failed, skipping fire");
                        continue;
                    }
                },
                None => entry.payload.clone(),
            };

            match self.engine.deliver_scheduled(&integration, entry.schedule_id.as_str(), &entry.tenant_id, payload).await {
                Ok(_) => self.metrics.delivery_attempted(integration.id.as_str(), "scheduled"),
                Err(err) => tracing::error!(schedule_id = %entry.schedule_id, error = %err, "scheduled delivery attempt errored"),
            }
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::core::IntegrationId;
    use gateway_core::core::ScheduleId;
    use gateway_core::core::TenantId;
    use gateway_core::core::schedule::ScheduleMode;
    use gateway_core::core::schedule::ScheduleStatus;
    use gateway_core::core::schedule::ScheduledDelivery;
    use gateway_core::runtime::InMemoryConfigStore;
    use gateway_core::runtime::InMemoryDlqStore;
    use gateway_core::runtime::InMemoryExecutionLogStore;
    use gateway_core::runtime::InMemoryScheduleStore;

    use super::*;
    use crate::fetch::GatewayDataSource;
    use crate::metrics::CountingMetrics;
    use crate::test_support;

    fn due_delayed(schedule_id: &str, integration_id: &str) -> ScheduledDelivery {
        ScheduledDelivery {
            schedule_id: ScheduleId::new(schedule_id),
            integration_id: IntegrationId::new(integration_id),
            tenant_id: TenantId::new("tenant-a"),
            payload: serde_json::json!({"ok": true}),
            mode: ScheduleMode::Delayed,
            fire_at: Timestamp::from_millis(0),
            occurrences_fired: 0,
            status: ScheduleStatus::Pending,
        }
    }

    #[tokio::test]
    async fn run_once_fires_and_skips_when_integration_is_gone() {
        let schedules = Arc::new(InMemoryScheduleStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let entry = due_delayed("sched-1", "missing-integration");
        let schedule_id = entry.schedule_id.clone();
        schedules.upsert(&entry).await.expect("seed schedule");

        let log_store = Arc::new(InMemoryExecutionLogStore::new());
        let dlq_store = Arc::new(InMemoryDlqStore::new());
        let engine = Arc::new(test_support::engine(config_store.clone(), log_store, dlq_store));
        let data_source = Arc::new(GatewayDataSource::new(reqwest::Client::new(), None));
        let metrics = Arc::new(CountingMetrics::default());
        let worker = ScheduleWorker::new(schedules.clone(), config_store, engine, data_source, metrics.clone());

        let claimed = worker.run_once(10).await.expect("run_once");
        assert_eq!(claimed, 1);

        let stored = schedules.get(&schedule_id).await.expect("get").expect("still present");
        assert_eq!(stored.status, ScheduleStatus::Sent);
        assert_eq!(metrics.delivery_attempts.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn run_once_with_nothing_due_claims_nothing() {
        let schedules = Arc::new(InMemoryScheduleStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let log_store = Arc::new(InMemoryExecutionLogStore::new());
        let dlq_store = Arc::new(InMemoryDlqStore::new());
        let engine = Arc::new(test_support::engine(config_store.clone(), log_store, dlq_store));
        let data_source = Arc::new(GatewayDataSource::new(reqwest::Client::new(), None));
        let metrics = Arc::new(CountingMetrics::default());
        let worker = ScheduleWorker::new(schedules, config_store, engine, data_source, metrics);

        let claimed = worker.run_once(10).await.expect("run_once");
        assert_eq!(claimed, 0);
    }

    #[tokio::test]
    async fn run_once_skips_the_fire_when_fetch_data_fails() {
        let schedules = Arc::new(InMemoryScheduleStore::new());
        let config_store = Arc::new(InMemoryConfigStore::new());
        let mut integration = test_support::config("int-sql", "tenant-a", "order.created", "http://example.invalid/sink");
        integration.fetch_query =
            Some(gateway_core::core::FetchQuerySpec { source: gateway_core::core::config::FetchSource::Sql, query: "SELECT 1".to_string() });
        config_store.save(&integration).await.expect("seed integration");
        let entry = due_delayed("sched-sql", "int-sql");
        let schedule_id = entry.schedule_id.clone();
        schedules.upsert(&entry).await.expect("seed schedule");

        let log_store = Arc::new(InMemoryExecutionLogStore::new());
        let dlq_store = Arc::new(InMemoryDlqStore::new());
        let engine = Arc::new(test_support::engine(config_store.clone(), log_store, dlq_store));
        let data_source = Arc::new(GatewayDataSource::new(reqwest::Client::new(), None));
        let metrics = Arc::new(CountingMetrics::default());
        let worker = ScheduleWorker::new(schedules.clone(), config_store, engine, data_source, metrics.clone());

        let claimed = worker.run_once(10).await.expect("run_once");
        assert_eq!(claimed, 1);
        assert_eq!(metrics.delivery_attempts.load(std::sync::atomic::Ordering::Relaxed), 0);
        let stored = schedules.get(&schedule_id).await.expect("get").expect("still present");
        assert_eq!(stored.status, ScheduleStatus::Sent);
    }
}
