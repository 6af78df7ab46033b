// gateway-server/src/handlers/events.rs
// ============================================================================
// Module: Test Notification Handler
// Description: POST /api/v1/events/test-notification-queue
// Purpose: Inject one synthetic event straight into the audit ledger and
//          dispatch it immediately, bypassing a real source adapter, so an
//          operator can exercise the matcher/delivery path on demand.
// Dependencies: axum, gateway-core
// ============================================================================

use axum::Json;
use axum::extract::State;
use gateway_core::core::EventAudit;
use gateway_core::core::EventId;
use gateway_core::core::TenantId;
use gateway_core::core::Timestamp;
use gateway_core::core::audit::EventStatus;
use gateway_contract::TestNotificationRequest;
use gateway_contract::TestNotificationResponse;
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

/// Ingests and immediately dispatches a synthetic event.
pub async fn test_notification(State(state): State<AppState>, Json(body): Json<TestNotificationRequest>) -> Result<Json<TestNotificationResponse>, ServerError> {
    let event_id = EventId::new(Uuid::new_v4().to_string());
    let tenant_id = TenantId::new(body.tenant_id);

    let audit = EventAudit {
        event_id: event_id.clone(),
        tenant_id: tenant_id.clone(),
        event_type: body.event_type,
        received_at: Timestamp::now(),
        status: EventStatus::Pending,
        started_at: None,
        finished_at: None,
        skip_category: None,
        payload_summary: body.payload.clone(),
        payload_full: Some(body.payload),
        checkpoint_offset: body.checkpoint_offset,
        ingest_latency_ms: Some(0),
    };
    state.audit_store.ingest(audit).await?;

    let dispatched = state.dispatcher.dispatch(&event_id, &tenant_id).await?;
    Ok(Json(TestNotificationResponse { event_id: event_id.to_string(), dispatched }))
}
