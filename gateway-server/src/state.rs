// gateway-server/src/state.rs
// ============================================================================
// Module: Application State
// Description: The collaborators every HTTP handler is wired against.
// Purpose: One `Clone`-able handle passed to axum's `Router::with_state`.
// Dependencies: gateway-core, gateway-delivery
// ============================================================================

use std::sync::Arc;

use gateway_config::GatewayAuthConfig;
use gateway_core::interfaces::AuditStore;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::DlqStore;
use gateway_core::interfaces::ExecutionLogStore;
use gateway_delivery::DeliveryEngine;
use gateway_delivery::EventDispatcher;

/// Shared collaborators for every route handler.
///
/// Cheap to clone: every field is an `Arc`, matching the rest of the
/// codebase's convention of passing shared ownership rather than references
/// through async boundaries.
#[derive(Clone)]
pub struct AppState {
    /// Runs the outbound/inbound/scheduled delivery pipeline.
    pub engine: Arc<DeliveryEngine>,
    /// Claims and fans out freshly ingested events; used by the
    /// test-notification endpoint to dispatch synchronously.
    pub dispatcher: Arc<EventDispatcher>,
    /// Integration configuration lookup.
    pub config_store: Arc<dyn ConfigStore>,
    /// Event audit ledger, used by the test-notification endpoint to ingest
    /// a synthetic row ahead of dispatch.
    pub audit_store: Arc<dyn AuditStore>,
    /// Dead-letter queue persistence.
    pub dlq_store: Arc<dyn DlqStore>,
    /// Unified execution log persistence.
    pub log_store: Arc<dyn ExecutionLogStore>,
    /// Control-surface auth secrets.
    pub auth: GatewayAuthConfig,
}
