// gateway-core/src/interfaces/mod.rs
// ============================================================================
// Module: Gateway Interfaces
// Description: Backend-agnostic interfaces for persistence, sandboxing, and dispatch.
// Purpose: Define the contract surfaces implemented by sibling crates.
// Dependencies: crate::core, async-trait, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the matching/transform/validation logic in
//! [`crate::runtime`] integrates with concrete persistence (`gateway-store-sqlite`),
//! the sandboxed script runtime (`gateway-sandbox`), and outbound HTTP
//! (`gateway-providers`), without embedding those backends here.
//! Implementations must fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::DLQEntry;
use crate::core::DlqId;
use crate::core::EventAudit;
use crate::core::EventId;
use crate::core::ExecutionLog;
use crate::core::IntegrationConfig;
use crate::core::IntegrationId;
use crate::core::LookupTable;
use crate::core::RateLimitWindow;
use crate::core::ScheduleId;
use crate::core::ScheduledDelivery;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors raised by any persistence-backed interface.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage I/O failure.
    #[error("store io error: {0}")]
    Io(String),
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// A CAS precondition was not met (the record was not in the expected state).
    #[error("cas precondition failed: {0}")]
    CasFailed(String),
    /// Stored data failed to deserialize or violated an invariant on read.
    #[error("store data invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Store
// ============================================================================

/// Read-through, cached access to integration configuration (C1).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetches one integration by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure; `Ok(None)` on a clean miss.
    async fn get_by_id(&self, id: &IntegrationId) -> Result<Option<IntegrationConfig>, StoreError>;

    /// Lists active integrations whose tenant scope and event type could
    /// apply to `(tenant_id, event_type)`. Implementations may return a
    /// superset (e.g. all active integrations for the tenant's whole
    /// ancestor chain); the matcher performs the authoritative filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn list_for_tenant_and_event(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<IntegrationConfig>, StoreError>;

    /// Returns the ancestor chain of `tenant_id`, nearest-parent first,
    /// excluding `tenant_id` itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn ancestors_of(&self, tenant_id: &TenantId) -> Result<Vec<TenantId>, StoreError>;

    /// Applies an auth token-cache patch directly, bypassing the read cache,
    /// under a per-integration lock held by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` does not exist.
    async fn update_token_cache(&self, id: &IntegrationId, patch: Value) -> Result<(), StoreError>;

    /// Saves (inserts or replaces) an integration configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn save(&self, config: &IntegrationConfig) -> Result<(), StoreError>;

    /// Resolves a lookup table for `(tenant_id, lookup_type)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn get_lookup_table(
        &self,
        tenant_id: &TenantId,
        lookup_type: &str,
    ) -> Result<Option<LookupTable>, StoreError>;
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Per-event audit ledger persistence (C2).
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persists a freshly ingested `PENDING` row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn ingest(&self, audit: EventAudit) -> Result<(), StoreError>;

    /// Attempts the CAS transition `PENDING -> PROCESSING` for `event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the row does not exist, or
    /// [`StoreError::CasFailed`] if it is not currently `PENDING`.
    async fn claim(&self, event_id: &EventId) -> Result<EventAudit, StoreError>;

    /// Writes a terminal state for `event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn finalize(&self, audit: &EventAudit) -> Result<(), StoreError>;

    /// Returns `PROCESSING` rows whose `startedAt` is older than `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn find_stuck_candidates(&self, threshold: Timestamp) -> Result<Vec<EventAudit>, StoreError>;

    /// Returns the highest checkpoint offset previously ingested for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn last_checkpoint(&self, tenant_id: &TenantId) -> Result<Option<i64>, StoreError>;
}

// ============================================================================
// SECTION: Execution Log Store
// ============================================================================

/// Unified execution log persistence (C12).
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    /// Persists a newly opened log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn open(&self, log: ExecutionLog) -> Result<(), StoreError>;

    /// Appends state for an in-flight or finalized log, replacing the
    /// previously stored revision under the writer lock for `trace_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn save(&self, log: &ExecutionLog) -> Result<(), StoreError>;

    /// Fetches a log by trace id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn get(&self, trace_id: &TraceId) -> Result<Option<ExecutionLog>, StoreError>;

    /// Lists logs, most recent first, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ExecutionLog>, StoreError>;
}

// ============================================================================
// SECTION: DLQ Store
// ============================================================================

/// Dead-letter-queue persistence (C10).
#[async_trait]
pub trait DlqStore: Send + Sync {
    /// Inserts or replaces a DLQ entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn upsert(&self, entry: &DLQEntry) -> Result<(), StoreError>;

    /// Fetches one entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn get(&self, dlq_id: &DlqId) -> Result<Option<DLQEntry>, StoreError>;

    /// Lists entries, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn list(&self, limit: usize) -> Result<Vec<DLQEntry>, StoreError>;

    /// Claims entries with `status=pending AND nextRetryAt <= now`, bounded
    /// by `batch_size`, transitioning each to `retrying` as part of the
    /// claim.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn claim_due(&self, now: Timestamp, batch_size: usize) -> Result<Vec<DLQEntry>, StoreError>;

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn delete(&self, dlq_id: &DlqId) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Schedule Store
// ============================================================================

/// Scheduled-delivery persistence (C11).
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Inserts or replaces a scheduled delivery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn upsert(&self, entry: &ScheduledDelivery) -> Result<(), StoreError>;

    /// Fetches one entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn get(&self, schedule_id: &ScheduleId) -> Result<Option<ScheduledDelivery>, StoreError>;

    /// Claims entries due to fire at or before `now`, bounded by `batch_size`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    async fn claim_due(&self, now: Timestamp, batch_size: usize) -> Result<Vec<ScheduledDelivery>, StoreError>;
}

// ============================================================================
// SECTION: Sandbox
// ============================================================================

/// Errors raised executing a sandboxed script.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The script exceeded its wall-clock budget.
    #[error("script timed out after {0}ms")]
    Timeout(u64),
    /// The script threw, or failed to parse/compile.
    #[error("script error: {0}")]
    ScriptFailed(String),
    /// The script's return value did not satisfy the calling context's contract
    /// (e.g. a transform script must return an object).
    #[error("script returned an invalid result: {0}")]
    InvalidResult(String),
}

/// Binding surface exposed to a sandboxed script invocation.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    /// The event/message payload bound as `payload`.
    pub payload: Value,
    /// The `context` binding: `{eventType, tenantId, orgId}`.
    pub context: Value,
    /// Wall-clock timeout for this invocation.
    pub timeout: std::time::Duration,
    /// Lookup tables in ancestor-first resolution order, pre-fetched by the
    /// caller (lookup resolution itself needs the async config store, which
    /// the sandbox cannot reach from a synchronous script call). Backs the
    /// `lookup(code, type)` binding. Empty for condition scripts, which do
    /// not use `lookup`.
    pub lookup_tables: Vec<LookupTable>,
}

/// Executes user-authored scripts in an isolated runtime with a fixed helper
/// surface (C5). Implementations must forbid filesystem/network access,
/// dynamic evaluation, and ambient globals.
pub trait Sandbox: Send + Sync {
    /// Evaluates `script` against `ctx`, returning its top-level expression value.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] on timeout, script failure, or contract violation.
    fn evaluate(&self, script: &str, ctx: &SandboxContext) -> Result<Value, SandboxError>;
}
