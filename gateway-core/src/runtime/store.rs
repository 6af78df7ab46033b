// gateway-core/src/runtime/store.rs
// ============================================================================
// Module: Gateway In-Memory Stores
// Description: Simple in-memory implementations of every interfaces::*Store trait.
// Purpose: Provide deterministic store implementations for tests and local demos.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! These stores are not intended for production use; `gateway-store-sqlite`
//! provides the persisted implementations. Each store guards a plain
//! `std::sync::Mutex`-protected map: lock scopes are short and never held
//! across an `.await`, so a synchronous mutex is the right tool even inside
//! these `async_trait` methods.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::DLQEntry;
use crate::core::DlqId;
use crate::core::DlqStatus;
use crate::core::EventAudit;
use crate::core::EventId;
use crate::core::EventStatus;
use crate::core::ExecutionLog;
use crate::core::IntegrationConfig;
use crate::core::IntegrationId;
use crate::core::LookupTable;
use crate::core::ScheduleId;
use crate::core::ScheduleStatus;
use crate::core::ScheduledDelivery;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::interfaces::AuditStore;
use crate::interfaces::ConfigStore;
use crate::interfaces::DlqStore;
use crate::interfaces::ExecutionLogStore;
use crate::interfaces::ScheduleStore;
use crate::interfaces::StoreError;

fn poisoned(what: &str) -> StoreError {
    StoreError::Io(format!("{what} mutex poisoned"))
}

// ============================================================================
// SECTION: Config Store
// ============================================================================

/// In-memory [`ConfigStore`] keyed by integration id, with a parallel tenant
/// parent map and a lookup-table map for tests and local demos.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConfigStore {
    configs: Arc<Mutex<BTreeMap<String, IntegrationConfig>>>,
    parents: Arc<Mutex<BTreeMap<String, TenantId>>>,
    lookup_tables: Arc<Mutex<BTreeMap<(String, String), LookupTable>>>,
}

impl InMemoryConfigStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `child`'s parent tenant, used by [`ConfigStore::ancestors_of`].
    pub fn set_parent(&self, child: TenantId, parent: TenantId) {
        self.parents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(child.to_string(), parent);
    }

    /// Inserts or replaces a lookup table for `(tenant_id, lookup_type)`.
    pub fn set_lookup_table(&self, table: LookupTable) {
        self.lookup_tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((table.tenant_id.to_string(), table.lookup_type.clone()), table);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_by_id(&self, id: &IntegrationId) -> Result<Option<IntegrationConfig>, StoreError> {
        let guard = self.configs.lock().map_err(|_| poisoned("config store"))?;
        Ok(guard.get(id.as_str()).cloned())
    }

    async fn list_for_tenant_and_event(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<IntegrationConfig>, StoreError> {
        let guard = self.configs.lock().map_err(|_| poisoned("config store"))?;
        Ok(guard
            .values()
            .filter(|config| config.is_active && config.matches_event_type(event_type))
            .filter(|config| {
                &config.tenant.tenant_id == tenant_id
                    || matches!(config.tenant.scope, crate::core::Scope::IncludeChildren)
            })
            .cloned()
            .collect())
    }

    async fn ancestors_of(&self, tenant_id: &TenantId) -> Result<Vec<TenantId>, StoreError> {
        let guard = self.parents.lock().map_err(|_| poisoned("parent map"))?;
        let mut chain = Vec::new();
        let mut current = tenant_id.clone();
        while let Some(parent) = guard.get(current.as_str()) {
            chain.push(parent.clone());
            current = parent.clone();
            if chain.len() > 64 {
                return Err(StoreError::Invalid(format!(
                    "tenant hierarchy cycle detected at {tenant_id}"
                )));
            }
        }
        Ok(chain)
    }

    async fn update_token_cache(&self, id: &IntegrationId, patch: Value) -> Result<(), StoreError> {
        let mut guard = self.configs.lock().map_err(|_| poisoned("config store"))?;
        let config = guard
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        match &mut config.auth {
            crate::core::AuthSpec::OAuth2 { cached_token, .. } | crate::core::AuthSpec::Custom { cached_token, .. } => {
                *cached_token = serde_json::from_value(patch).map_err(|e| StoreError::Invalid(e.to_string()))?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn save(&self, config: &IntegrationConfig) -> Result<(), StoreError> {
        self.configs
            .lock()
            .map_err(|_| poisoned("config store"))?
            .insert(config.id.to_string(), config.clone());
        Ok(())
    }

    async fn get_lookup_table(
        &self,
        tenant_id: &TenantId,
        lookup_type: &str,
    ) -> Result<Option<LookupTable>, StoreError> {
        let guard = self.lookup_tables.lock().map_err(|_| poisoned("lookup tables"))?;
        Ok(guard.get(&(tenant_id.to_string(), lookup_type.to_string())).cloned())
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// In-memory [`AuditStore`] keyed by event id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    rows: Arc<Mutex<BTreeMap<String, EventAudit>>>,
}

impl InMemoryAuditStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn ingest(&self, audit: EventAudit) -> Result<(), StoreError> {
        self.rows
            .lock()
            .map_err(|_| poisoned("audit store"))?
            .insert(audit.event_id.to_string(), audit);
        Ok(())
    }

    async fn claim(&self, event_id: &EventId) -> Result<EventAudit, StoreError> {
        let mut guard = self.rows.lock().map_err(|_| poisoned("audit store"))?;
        let row = guard
            .get_mut(event_id.as_str())
            .ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
        if !row.try_claim() {
            return Err(StoreError::CasFailed(event_id.to_string()));
        }
        Ok(row.clone())
    }

    async fn finalize(&self, audit: &EventAudit) -> Result<(), StoreError> {
        self.rows
            .lock()
            .map_err(|_| poisoned("audit store"))?
            .insert(audit.event_id.to_string(), audit.clone());
        Ok(())
    }

    async fn find_stuck_candidates(&self, threshold: Timestamp) -> Result<Vec<EventAudit>, StoreError> {
        let guard = self.rows.lock().map_err(|_| poisoned("audit store"))?;
        Ok(guard
            .values()
            .filter(|row| row.status == EventStatus::Processing && row.started_at.is_some_and(|s| s <= threshold))
            .cloned()
            .collect())
    }

    async fn last_checkpoint(&self, tenant_id: &TenantId) -> Result<Option<i64>, StoreError> {
        let guard = self.rows.lock().map_err(|_| poisoned("audit store"))?;
        Ok(guard
            .values()
            .filter(|row| &row.tenant_id == tenant_id)
            .map(|row| row.checkpoint_offset)
            .max())
    }
}

// ============================================================================
// SECTION: Execution Log Store
// ============================================================================

/// In-memory [`ExecutionLogStore`] keyed by trace id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExecutionLogStore {
    logs: Arc<Mutex<BTreeMap<String, ExecutionLog>>>,
}

impl InMemoryExecutionLogStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionLogStore for InMemoryExecutionLogStore {
    async fn open(&self, log: ExecutionLog) -> Result<(), StoreError> {
        self.logs
            .lock()
            .map_err(|_| poisoned("execution log store"))?
            .insert(log.trace_id.to_string(), log);
        Ok(())
    }

    async fn save(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        self.logs
            .lock()
            .map_err(|_| poisoned("execution log store"))?
            .insert(log.trace_id.to_string(), log.clone());
        Ok(())
    }

    async fn get(&self, trace_id: &TraceId) -> Result<Option<ExecutionLog>, StoreError> {
        let guard = self.logs.lock().map_err(|_| poisoned("execution log store"))?;
        Ok(guard.get(trace_id.as_str()).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionLog>, StoreError> {
        let guard = self.logs.lock().map_err(|_| poisoned("execution log store"))?;
        let mut logs: Vec<ExecutionLog> = guard.values().cloned().collect();
        logs.sort_by_key(|log| std::cmp::Reverse(log.started_at));
        logs.truncate(limit);
        Ok(logs)
    }
}

// ============================================================================
// SECTION: DLQ Store
// ============================================================================

/// In-memory [`DlqStore`] keyed by dlq id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDlqStore {
    entries: Arc<Mutex<BTreeMap<String, DLQEntry>>>,
}

impl InMemoryDlqStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DlqStore for InMemoryDlqStore {
    async fn upsert(&self, entry: &DLQEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| poisoned("dlq store"))?
            .insert(entry.dlq_id.to_string(), entry.clone());
        Ok(())
    }

    async fn get(&self, dlq_id: &DlqId) -> Result<Option<DLQEntry>, StoreError> {
        let guard = self.entries.lock().map_err(|_| poisoned("dlq store"))?;
        Ok(guard.get(dlq_id.as_str()).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DLQEntry>, StoreError> {
        let guard = self.entries.lock().map_err(|_| poisoned("dlq store"))?;
        Ok(guard.values().take(limit).cloned().collect())
    }

    async fn claim_due(&self, now: Timestamp, batch_size: usize) -> Result<Vec<DLQEntry>, StoreError> {
        let mut guard = self.entries.lock().map_err(|_| poisoned("dlq store"))?;
        let due_ids: Vec<String> = guard
            .values()
            .filter(|entry| entry.status == DlqStatus::Pending && entry.next_retry_at <= now)
            .take(batch_size)
            .map(|entry| entry.dlq_id.to_string())
            .collect();
        let mut claimed = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            if let Some(entry) = guard.get_mut(&id) {
                if entry.claim().is_ok() {
                    claimed.push(entry.clone());
                }
            }
        }
        Ok(claimed)
    }

    async fn delete(&self, dlq_id: &DlqId) -> Result<(), StoreError> {
        self.entries.lock().map_err(|_| poisoned("dlq store"))?.remove(dlq_id.as_str());
        Ok(())
    }
}

// ============================================================================
// SECTION: Schedule Store
// ============================================================================

/// In-memory [`ScheduleStore`] keyed by schedule id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryScheduleStore {
    entries: Arc<Mutex<BTreeMap<String, ScheduledDelivery>>>,
}

impl InMemoryScheduleStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn upsert(&self, entry: &ScheduledDelivery) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| poisoned("schedule store"))?
            .insert(entry.schedule_id.to_string(), entry.clone());
        Ok(())
    }

    async fn get(&self, schedule_id: &ScheduleId) -> Result<Option<ScheduledDelivery>, StoreError> {
        let guard = self.entries.lock().map_err(|_| poisoned("schedule store"))?;
        Ok(guard.get(schedule_id.as_str()).cloned())
    }

    async fn claim_due(&self, now: Timestamp, batch_size: usize) -> Result<Vec<ScheduledDelivery>, StoreError> {
        let mut guard = self.entries.lock().map_err(|_| poisoned("schedule store"))?;
        let due_ids: Vec<String> = guard
            .values()
            .filter(|entry| matches!(entry.status, ScheduleStatus::Pending | ScheduleStatus::Overdue) && entry.is_due(now))
            .take(batch_size)
            .map(|entry| entry.schedule_id.to_string())
            .collect();
        Ok(due_ids
            .into_iter()
            .filter_map(|id| guard.get(&id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCategory;
    use crate::core::RetryStrategy;

    #[tokio::test]
    async fn config_store_resolves_ancestor_chain() {
        let store = InMemoryConfigStore::new();
        store.set_parent(TenantId::new("child"), TenantId::new("parent"));
        store.set_parent(TenantId::new("parent"), TenantId::new("root"));
        let ancestors = store.ancestors_of(&TenantId::new("child")).await.unwrap();
        assert_eq!(ancestors, vec![TenantId::new("parent"), TenantId::new("root")]);
    }

    #[tokio::test]
    async fn audit_store_claim_is_cas() {
        let store = InMemoryAuditStore::new();
        let audit = EventAudit::ingest(
            EventId::new("e1"),
            TenantId::new("t1"),
            "OP_VISIT_CREATED".to_string(),
            1,
            serde_json::json!({}),
            None,
            None,
        );
        store.ingest(audit).await.unwrap();
        let claimed = store.claim(&EventId::new("e1")).await.unwrap();
        assert_eq!(claimed.status, EventStatus::Processing);
        assert!(store.claim(&EventId::new("e1")).await.is_err());
    }

    #[tokio::test]
    async fn dlq_store_claims_only_due_entries() {
        let store = InMemoryDlqStore::new();
        let mut entry = DLQEntry {
            dlq_id: DlqId::new("dlq-1"),
            trace_id: TraceId::new("trace-1"),
            execution_log_id: TraceId::new("trace-1"),
            integration_id: IntegrationId::new("int-1"),
            tenant_id: TenantId::new("t1"),
            direction: crate::core::Direction::Outbound,
            payload: serde_json::json!({}),
            error: crate::core::ErrorDetail {
                message: "boom".to_string(),
                code: None,
                category: ErrorCategory::Network,
                status_code: None,
            },
            retry_strategy: RetryStrategy::Exponential,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: Timestamp::from_millis(1_000),
            last_attempt_at: Timestamp::from_millis(0),
            status: DlqStatus::Pending,
            resolution: None,
        };
        store.upsert(&entry).await.unwrap();
        assert!(store.claim_due(Timestamp::from_millis(0), 10).await.unwrap().is_empty());
        let claimed = store.claim_due(Timestamp::from_millis(1_000), 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        entry.claim().unwrap();
        assert_eq!(claimed[0].status, entry.status);
    }
}
