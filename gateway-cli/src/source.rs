// gateway-cli/src/source.rs
// ============================================================================
// Module: Null Event Source
// Description: An `EventSource` that never has anything to ingest.
// Purpose: Let the ingest worker loop start unconditionally even when no
//          concrete source adapter is configured for this deployment.
// Dependencies: async-trait, gateway-delivery
// ============================================================================

//! ## Overview
//! `gateway-delivery` ships generic source adapters (`RelationalSource`,
//! `LogSource`) parameterized over a backend-specific trait this deployment
//! has no concrete implementation of yet. Rather than leave the ingest loop
//! unstarted, [`NullEventSource`] polls cleanly and always returns no rows,
//! so a deployment with `SOURCE_URI` unset still runs every other worker
//! (retry, schedule, watchdog) and the HTTP surface normally.

use async_trait::async_trait;
use gateway_delivery::EventSource;
use gateway_delivery::Ingested;
use gateway_delivery::SourceError;

/// A source with nothing to poll.
pub struct NullEventSource;

#[async_trait]
impl EventSource for NullEventSource {
    async fn poll(&self, _batch_size: usize) -> Result<Vec<Ingested>, SourceError> {
        Ok(Vec::new())
    }
}
