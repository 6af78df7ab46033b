// gateway-server/src/handlers/health.rs
// ============================================================================
// Module: Health Handler
// Description: GET /health
// ============================================================================

use axum::Json;
use gateway_contract::HealthResponse;

/// Liveness probe. Always `200 {"status": "ok"}` once the process can serve at all.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}
