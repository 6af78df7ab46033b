// gateway-delivery/src/inbound.rs
// ============================================================================
// Module: Inbound Proxy Types
// Description: Request/response/outcome types for the inbound delivery leg.
// Purpose: Carry one externally received call through
//          inbound_auth -> request_transform -> http_request -> response_transform.
// Dependencies: gateway-core
// ============================================================================

//! ## Overview
//! [`InboundRequest`] is what the server crate hands [`crate::pipeline::DeliveryEngine::deliver_inbound`]
//! after parsing one call to the inbound proxy endpoint. The engine always
//! returns an [`InboundOutcome::Response`] — auth failures, transform
//! failures, and upstream errors all become an HTTP response rather than a
//! `DeliveryError`, since there is no DLQ to hand an inbound caller's request
//! off to.

use std::collections::HashMap;

use serde_json::Value;

/// One call received on the inbound proxy endpoint.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Correlates this call to its execution log entry.
    pub request_id: String,
    /// Caller-presented headers, used for inbound auth verification.
    pub headers: HashMap<String, String>,
    /// Parsed JSON request body.
    pub body: Value,
}

/// A response ready to hand back to the inbound caller.
#[derive(Debug, Clone)]
pub struct InboundResponse {
    /// HTTP status to return.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Value,
}

/// Result of running the inbound proxy pipeline once.
#[derive(Debug, Clone)]
pub enum InboundOutcome {
    /// The call completed (successfully or not); this is the response to
    /// return to the caller.
    Response(InboundResponse),
}

/// Errors raised running the inbound proxy pipeline. Reserved for future
/// infrastructure-level failures the engine can't itself turn into an HTTP
/// response; today every failure path resolves to an [`InboundOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] gateway_core::interfaces::StoreError),
}
