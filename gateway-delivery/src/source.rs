// gateway-delivery/src/source.rs
// ============================================================================
// Module: Source Adapters
// Description: C3 — relational-checkpoint and distributed-log event ingestion.
// Purpose: Normalize either backing store into audit-ledger ingests.
// Dependencies: gateway-core, async-trait
// ============================================================================

//! ## Overview
//! Two adapters sit behind one `EventSource::poll` call. [`RelationalSource`]
//! reads a bounded batch where `id > checkpoint` and relies on the audit
//! ledger's own `last_checkpoint` for the next read, so it never tracks
//! offset state itself. [`LogSource`] consumes a partition with manual
//! offset commit and expects strictly contiguous offsets; a gap is reported
//! through [`GatewayMetrics`] and [`tracing`] but never auto-filled, since the
//! source is the only party that knows what filled the gap would mean.
//!
//! Both adapters are at-least-once: a row is only considered durably ingested
//! once `AuditStore::ingest` returns `Ok`, and any row that fails ingestion
//! stops the batch rather than skipping ahead, so the next poll retries it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use gateway_core::core::EventId;
use gateway_core::core::TenantId;
use gateway_core::core::audit::EventAudit;
use gateway_core::interfaces::AuditStore;
use gateway_core::interfaces::StoreError;
use serde_json::Value;
use thiserror::Error;

use crate::metrics::GatewayMetrics;

// ============================================================================
// SECTION: Raw Events
// ============================================================================

/// One event as read from a backing source, prior to audit ingestion.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Natural key of the event, stable across retries.
    pub event_id: EventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Event type used for matcher fan-out.
    pub event_type: String,
    /// Monotonic offset/checkpoint this row occupies in its source.
    pub offset: i64,
    /// Full event payload.
    pub payload: Value,
}

fn summarize(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(map.iter().take(8).map(|(k, v)| (k.clone(), summary_leaf(v))).collect()),
        other => summary_leaf(other),
    }
}

fn summary_leaf(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String("<nested>".to_string()),
        other => other.clone(),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised polling or committing against a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing source could not be read.
    #[error("source fetch failed: {0}")]
    Fetch(String),
    /// Offset commit against the backing source failed.
    #[error("source commit failed: {0}")]
    Commit(String),
    /// Writing the audit ingest failed.
    #[error("audit ingest failed: {0}")]
    Audit(#[from] StoreError),
}

// ============================================================================
// SECTION: Common Interface
// ============================================================================

/// Identifies one freshly ingested audit row, ready for immediate dispatch.
#[derive(Debug, Clone)]
pub struct Ingested {
    /// Natural key of the event.
    pub event_id: EventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
}

/// Polls a source for new events and ingests them into the audit ledger.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Reads up to `batch_size` new events and ingests each into the audit
    /// ledger in order, stopping at the first ingest failure. Returns the
    /// events successfully ingested, in ingest order, so the caller can
    /// dispatch each immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the backing source cannot be read or an
    /// audit ingest fails.
    async fn poll(&self, batch_size: usize) -> Result<Vec<Ingested>, SourceError>;
}

// ============================================================================
// SECTION: Relational Source
// ============================================================================

/// Reads rows from a relational store where `id > checkpoint`.
#[async_trait]
pub trait RelationalRows: Send + Sync {
    /// Fetches up to `batch_size` rows with `id > checkpoint`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Fetch`] when the underlying query fails.
    async fn fetch_since(&self, checkpoint: i64, batch_size: usize) -> Result<Vec<RawEvent>, SourceError>;
}

/// A source backed by a persisted monotonic-id checkpoint.
pub struct RelationalSource<R> {
    rows: R,
    audit: Arc<dyn AuditStore>,
    tenant_id: TenantId,
}

impl<R: RelationalRows> RelationalSource<R> {
    /// Builds a relational source polling on behalf of `tenant_id`.
    pub fn new(rows: R, audit: Arc<dyn AuditStore>, tenant_id: TenantId) -> Self {
        Self { rows, audit, tenant_id }
    }
}

#[async_trait]
impl<R: RelationalRows> EventSource for RelationalSource<R> {
    async fn poll(&self, batch_size: usize) -> Result<Vec<Ingested>, SourceError> {
        let checkpoint = self.audit.last_checkpoint(&self.tenant_id).await?.unwrap_or(0);
        let rows = self.rows.fetch_since(checkpoint, batch_size).await?;
        let mut ingested = Vec::new();
        for row in rows {
            let event_id = row.event_id.clone();
            let tenant_id = row.tenant_id.clone();
            let audit = EventAudit::ingest(
                row.event_id,
                row.tenant_id,
                row.event_type,
                row.offset,
                summarize(&row.payload),
                Some(row.payload),
                None,
            );
            self.audit.ingest(audit).await?;
            ingested.push(Ingested { event_id, tenant_id });
        }
        Ok(ingested)
    }
}

// ============================================================================
// SECTION: Distributed Log Source
// ============================================================================

/// A manual-commit consumer over a distributed log partition.
#[async_trait]
pub trait LogConsumer: Send + Sync {
    /// Fetches up to `max_batch` records not yet committed, ordered by offset.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Fetch`] when the underlying poll fails.
    async fn poll(&self, max_batch: usize) -> Result<Vec<RawEvent>, SourceError>;

    /// Commits `offset` as processed.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Commit`] when the underlying commit fails.
    async fn commit(&self, offset: i64) -> Result<(), SourceError>;
}

/// A source backed by a consumer-group partition with manual offset commit.
pub struct LogSource<C> {
    consumer: C,
    audit: Arc<dyn AuditStore>,
    metrics: Arc<dyn GatewayMetrics>,
    source_name: String,
    next_offset: Mutex<Option<i64>>,
}

impl<C: LogConsumer> LogSource<C> {
    /// Builds a log source with no expected next offset; the first record
    /// observed seeds the contiguity check.
    pub fn new(consumer: C, audit: Arc<dyn AuditStore>, metrics: Arc<dyn GatewayMetrics>, source_name: impl Into<String>) -> Self {
        Self { consumer, audit, metrics, source_name: source_name.into(), next_offset: Mutex::new(None) }
    }
}

#[async_trait]
impl<C: LogConsumer> EventSource for LogSource<C> {
    async fn poll(&self, batch_size: usize) -> Result<Vec<Ingested>, SourceError> {
        let records = self.consumer.poll(batch_size).await?;
        let mut ingested = Vec::new();
        for row in records {
            let expected = match self.next_offset.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            };
            if let Some(expected) = expected {
                if row.offset != expected {
                    self.metrics.source_gap_detected(&self.source_name, expected, row.offset);
                    tracing::warn!(source = %self.source_name, expected, actual = row.offset, "source offset gap detected");
                }
            }

            let event_id = row.event_id.clone();
            let tenant_id = row.tenant_id.clone();
            let audit = EventAudit::ingest(
                row.event_id,
                row.tenant_id,
                row.event_type,
                row.offset,
                summarize(&row.payload),
                Some(row.payload),
                None,
            );
            self.audit.ingest(audit).await?;
            self.consumer.commit(row.offset).await?;
            ingested.push(Ingested { event_id, tenant_id });

            let mut guard = match self.next_offset.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Some(row.offset + 1);
        }
        Ok(ingested)
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::runtime::InMemoryAuditStore;

    use super::*;
    use crate::metrics::CountingMetrics;

    struct FixedRows(Vec<RawEvent>);

    #[async_trait]
    impl RelationalRows for FixedRows {
        async fn fetch_since(&self, checkpoint: i64, batch_size: usize) -> Result<Vec<RawEvent>, SourceError> {
            Ok(self.0.iter().filter(|row| row.offset > checkpoint).take(batch_size).cloned().collect())
        }
    }

    fn raw(offset: i64) -> RawEvent {
        RawEvent {
            event_id: EventId::new(format!("evt-{offset}")),
            tenant_id: TenantId::new("tenant-a"),
            event_type: "order.created".to_string(),
            offset,
            payload: serde_json::json!({"n": offset}),
        }
    }

    #[tokio::test]
    async fn relational_source_ingests_rows_past_the_checkpoint() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let rows = FixedRows(vec![raw(1), raw(2), raw(3)]);
        let source = RelationalSource::new(rows, audit.clone(), TenantId::new("tenant-a"));

        let ingested = source.poll(10).await.expect("poll");
        assert_eq!(ingested.len(), 3);
        assert_eq!(audit.last_checkpoint(&TenantId::new("tenant-a")).await.expect("checkpoint"), Some(3));
    }

    struct QueueConsumer {
        records: Mutex<Vec<RawEvent>>,
        committed: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl LogConsumer for QueueConsumer {
        async fn poll(&self, max_batch: usize) -> Result<Vec<RawEvent>, SourceError> {
            let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
            let taken: Vec<RawEvent> = guard.drain(..guard.len().min(max_batch)).collect();
            Ok(taken)
        }

        async fn commit(&self, offset: i64) -> Result<(), SourceError> {
            self.committed.lock().unwrap_or_else(|e| e.into_inner()).push(offset);
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_source_detects_a_gap_and_reports_it() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let metrics = Arc::new(CountingMetrics::default());
        let consumer = QueueConsumer { records: Mutex::new(vec![raw(0), raw(2)]), committed: Mutex::new(Vec::new()) };
        let source = LogSource::new(consumer, audit, metrics.clone(), "test-partition");

        let ingested = source.poll(10).await.expect("poll");
        assert_eq!(ingested.len(), 2);
        assert_eq!(metrics.gaps_detected.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn log_source_commits_every_consumed_offset() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let metrics = Arc::new(CountingMetrics::default());
        let consumer = QueueConsumer { records: Mutex::new(vec![raw(0), raw(1)]), committed: Mutex::new(Vec::new()) };
        let source = LogSource::new(consumer, audit, metrics, "test-partition");

        source.poll(10).await.expect("poll");
        let committed = source.consumer.committed.lock().expect("lock committed").clone();
        assert_eq!(committed, vec![0, 1]);
    }
}
