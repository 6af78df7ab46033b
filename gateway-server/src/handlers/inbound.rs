// gateway-server/src/handlers/inbound.rs
// ============================================================================
// Module: Inbound Proxy Handler
// Description: POST /api/v1/integrations/{type}
// Purpose: Resolve the inbound-direction integration for (orgId, type) and
//          run it through DeliveryEngine::deliver_inbound.
// Dependencies: axum, gateway-core, gateway-delivery
// ============================================================================

use std::collections::HashMap;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use gateway_core::core::Direction;
use gateway_core::core::TenantId;
use gateway_delivery::InboundRequest;
use gateway_delivery::InboundOutcome;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Query parameters accepted on the inbound proxy endpoint.
#[derive(Debug, Deserialize)]
pub struct InboundQuery {
    /// Tenant the call is scoped to.
    #[serde(rename = "orgId")]
    pub org_id: String,
}

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers.iter().map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or("").to_string())).collect()
}

/// Proxies one externally received call through the inbound delivery pipeline.
pub async fn proxy_inbound(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    Query(query): Query<InboundQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ServerError> {
    let request_id = headers.get(REQUEST_ID_HEADER).and_then(|value| value.to_str().ok()).map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let tenant_id = TenantId::new(query.org_id.clone());
    let candidates = state.config_store.list_for_tenant_and_event(&tenant_id, &event_type).await?;
    let Some(integration) = candidates.into_iter().find(|candidate| candidate.is_active && candidate.direction == Direction::Inbound) else {
        return Err(ServerError::NotFound(format!("no active inbound integration for org {} and type {event_type}", query.org_id)));
    };

    let request = InboundRequest { request_id: request_id.clone(), headers: headers_to_map(&headers), body };
    let InboundOutcome::Response(outcome) = state.engine.deliver_inbound(&integration, request).await?;

    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Json(outcome.body)).into_response();
    for (name, value) in &outcome.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            response.headers_mut().insert(name, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    Ok(response)
}
